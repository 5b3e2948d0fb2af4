//! Connects to `/stream` and verifies it delivers more than one SSE frame
//! at a short refresh interval, then disconnects cleanly.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener as StdTcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use debug_stream::html::HtmlRenderer;
use debug_stream::http::HttpListener;
use debug_stream::test_support::FakeMachine;
use debug_stream::{IntrospectionProvider, Topic};

fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn stream_emits_multiple_events_then_stops_on_disconnect() {
    let port = free_port();
    let provider = Arc::new(IntrospectionProvider::new(Box::new(FakeMachine::running_default())));
    let html = Arc::new(HtmlRenderer::new(1, 2, port, 4));
    let listener = HttpListener::new(Topic::Cpu, port, provider, html);
    listener.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(3))).unwrap();
    stream.write_all(b"GET /stream?interval=20 HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    reader.read_line(&mut status_line).unwrap();
    assert!(status_line.starts_with("HTTP/1.1 200"));

    let mut headers_done = false;
    while !headers_done {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if line == "\r\n" {
            headers_done = true;
        }
    }

    let mut events_seen = 0;
    while events_seen < 3 {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if line.starts_with("data: ") {
            assert!(line.contains("\"status\""));
            events_seen += 1;
        }
    }

    drop(reader);
    listener.stop();
}
