//! Per-connection state machine for the debug HTTP servers.
//!
//! Grounded on `DebugHttpConnection` (see `original_source/src/debugger/
//! DebugHttpConnection.cc`): one thread per connection, a 5-second read
//! timeout and 64 KiB cap while buffering up to the end of headers, a
//! fixed routing table (`/`, `/info`, `/api`+`/api/info`, `/stream`), and
//! an SSE loop that polls for client disconnect with a peek read between
//! refresh ticks.

use std::io::{Read, Write};
use std::mem::MaybeUninit;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use socket2::SockRef;

use crate::html::HtmlRenderer;
use crate::introspect::IntrospectionProvider;
use crate::poller::Poller;
use crate::topic::Topic;

use super::request::HttpRequest;

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: usize = 64 * 1024;
const DEFAULT_MEMORY_SIZE: u32 = 256;
const DEFAULT_REFRESH_MS: u64 = 100;
const MIN_REFRESH_MS: u64 = 10;
const MAX_REFRESH_MS: u64 = 10_000;

/// Handles exactly one accepted TCP connection for one [`Topic`], then
/// returns. Intended to run on its own thread, spawned by [`super::listener::HttpListener`].
pub struct HttpConnection {
    topic: Topic,
    provider: Arc<IntrospectionProvider>,
    html: Arc<HtmlRenderer>,
}

impl HttpConnection {
    #[must_use]
    pub fn new(topic: Topic, provider: Arc<IntrospectionProvider>, html: Arc<HtmlRenderer>) -> Self {
        Self { topic, provider, html }
    }

    /// Run the connection to completion: read one request, dispatch it,
    /// and (for `/stream`) keep writing SSE frames until the client goes
    /// away or `poller` is aborted.
    pub fn serve(&self, mut stream: TcpStream, poller: &Poller) {
        let _ = stream.set_read_timeout(Some(READ_TIMEOUT));

        let Some(raw) = read_request(&mut stream) else {
            return;
        };
        let Some(request) = HttpRequest::parse(&raw) else {
            write_response(&mut stream, 400, "application/json", "{\"error\":\"Bad Request\"}");
            return;
        };

        let (mem_start, mem_size) = if self.topic == Topic::Memory {
            (
                parse_u32(request.query.get("start")).unwrap_or(0),
                parse_u32(request.query.get("size")).map_or(DEFAULT_MEMORY_SIZE, |s| s.min(0x10000)),
            )
        } else {
            (0, 0)
        };

        let refresh_ms = request
            .query
            .get("interval")
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(DEFAULT_REFRESH_MS, |v| v.clamp(MIN_REFRESH_MS, MAX_REFRESH_MS));

        match request.path.as_str() {
            "/" => self.handle_html(&mut stream, mem_start, mem_size),
            "/info" => {
                if request.accepts_html() {
                    self.handle_html(&mut stream, mem_start, mem_size);
                } else {
                    self.handle_api(&mut stream, mem_start, mem_size);
                }
            }
            "/api" | "/api/info" => self.handle_api(&mut stream, mem_start, mem_size),
            "/stream" => self.handle_stream(&mut stream, mem_start, mem_size, refresh_ms, poller),
            _ => write_response(&mut stream, 404, "application/json", "{\"error\":\"Not Found\"}"),
        }
    }

    fn generate_info(&self, mem_start: u32, mem_size: u32) -> String {
        match self.topic {
            Topic::Machine => self.provider.machine_info(),
            Topic::Io => self.provider.io_info(),
            Topic::Cpu => self.provider.cpu_info(),
            Topic::Memory => self.provider.memory_info(mem_start, mem_size),
            Topic::Push => unreachable!("HttpConnection never serves the push topic"),
        }
    }

    fn handle_html(&self, stream: &mut TcpStream, mem_start: u32, mem_size: u32) {
        let page = self.html.render(self.topic, &self.provider, mem_start, mem_size);
        write_response(stream, 200, "text/html; charset=utf-8", &page);
    }

    fn handle_api(&self, stream: &mut TcpStream, mem_start: u32, mem_size: u32) {
        let body = self.generate_info(mem_start, mem_size);
        write_response(stream, 200, "application/json", &body);
    }

    fn handle_stream(&self, stream: &mut TcpStream, mem_start: u32, mem_size: u32, refresh_ms: u64, poller: &Poller) {
        write_sse_header(stream);
        loop {
            if poller.is_aborted() {
                break;
            }
            let body = self.generate_info(mem_start, mem_size);
            if write_sse_event(stream, &body).is_err() {
                break;
            }
            std::thread::sleep(Duration::from_millis(refresh_ms));
            if peer_disconnected(stream) {
                break;
            }
        }
    }
}

fn parse_u32(value: Option<&String>) -> Option<u32> {
    let value = value?;
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if find_header_end(&buf).is_some() {
            break;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return None;
        }
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn write_response(stream: &mut TcpStream, status: u16, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status} {text}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nAccess-Control-Allow-Origin: *\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n{body}",
        status = status,
        text = status_text(status),
        content_type = content_type,
        len = body.len(),
        body = body,
    );
    let _ = stream.write_all(response.as_bytes());
}

fn write_sse_header(stream: &mut TcpStream) {
    let response = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nAccess-Control-Allow-Origin: *\r\nCache-Control: no-cache\r\nConnection: keep-alive\r\n\r\n";
    let _ = stream.write_all(response.as_bytes());
}

fn write_sse_event(stream: &mut TcpStream, data: &str) -> std::io::Result<()> {
    stream.write_all(format!("data: {data}\n\n").as_bytes())
}

/// Best-effort disconnect check: briefly switch the socket non-blocking,
/// peek one byte, and restore blocking mode. `Ok(0)` means the peer sent
/// FIN; anything else (data pending, would-block, error) is "still there".
fn peer_disconnected(stream: &TcpStream) -> bool {
    let sock = SockRef::from(stream);
    if sock.set_nonblocking(true).is_err() {
        return false;
    }
    let mut buf = [MaybeUninit::uninit(); 1];
    let result = sock.peek(&mut buf);
    let _ = sock.set_nonblocking(false);
    matches!(result, Ok(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::IntrospectionProvider;
    use crate::test_support::FakeMachine;
    use std::io::BufRead;
    use std::net::{TcpListener, TcpStream};

    fn spawn_echo_server() -> (HttpConnection, Poller) {
        let provider = Arc::new(IntrospectionProvider::new(Box::new(FakeMachine::running_default())));
        let html = Arc::new(HtmlRenderer::new(1, 2, 3, 4));
        (HttpConnection::new(Topic::Cpu, provider, html), Poller::new())
    }

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn api_request_returns_json() {
        let (conn, poller) = spawn_echo_server();
        let (mut client, server) = connected_pair();
        client.write_all(b"GET /api HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        conn.serve(server, &poller);

        let mut reader = std::io::BufReader::new(client);
        let mut status_line = String::new();
        reader.read_line(&mut status_line).unwrap();
        assert!(status_line.starts_with("HTTP/1.1 200"));
    }

    #[test]
    fn unknown_path_returns_404() {
        let (conn, poller) = spawn_echo_server();
        let (mut client, server) = connected_pair();
        client.write_all(b"GET /nope HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        conn.serve(server, &poller);

        let mut reader = std::io::BufReader::new(client);
        let mut status_line = String::new();
        reader.read_line(&mut status_line).unwrap();
        assert!(status_line.starts_with("HTTP/1.1 404"));
    }

    #[test]
    fn info_with_html_accept_serves_html() {
        let (conn, poller) = spawn_echo_server();
        let (mut client, server) = connected_pair();
        client.write_all(b"GET /info HTTP/1.1\r\nAccept: text/html\r\n\r\n").unwrap();
        conn.serve(server, &poller);

        let mut reader = std::io::BufReader::new(client);
        let mut status_line = String::new();
        reader.read_line(&mut status_line).unwrap();
        let mut rest = String::new();
        use std::io::Read as _;
        reader.read_to_string(&mut rest).unwrap();
        assert!(status_line.starts_with("HTTP/1.1 200"));
        assert!(rest.contains("<html") || rest.contains("<!DOCTYPE"));
    }

    #[test]
    fn parse_u32_accepts_hex_and_decimal() {
        assert_eq!(parse_u32(Some(&"0x100".to_string())), Some(0x100));
        assert_eq!(parse_u32(Some(&"256".to_string())), Some(256));
        assert_eq!(parse_u32(None), None);
    }
}
