//! Exercises one `HttpListener`'s full route table over a real TCP socket.

use std::io::{Read, Write};
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

fn get(port: u16, path: &str, extra_headers: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(format!("GET {path} HTTP/1.1\r\nHost: x\r\n{extra_headers}\r\n").as_bytes()).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

#[test]
fn every_documented_route_responds() {
    let port = free_port();
    let provider = Arc::new(IntrospectionProvider::new(Box::new(FakeMachine::running_default())));
    let html = Arc::new(HtmlRenderer::new(1, 2, 3, port));
    let listener = HttpListener::new(Topic::Memory, port, provider, html);
    listener.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let root = get(port, "/", "");
    assert!(root.starts_with("HTTP/1.1 200"));
    assert!(root.contains("<html") || root.contains("<!DOCTYPE"));

    let api = get(port, "/api?start=0x0000&size=16", "");
    assert!(api.starts_with("HTTP/1.1 200"));
    assert!(api.contains("\"data\""));

    let info_json = get(port, "/info", "Accept: application/json\r\n");
    assert!(info_json.contains("application/json"));

    let info_html = get(port, "/info", "Accept: text/html\r\n");
    assert!(info_html.contains("text/html"));

    let missing = get(port, "/does-not-exist", "");
    assert!(missing.starts_with("HTTP/1.1 404"));

    listener.stop();
}

#[test]
fn memory_topic_honors_start_and_size_query_params() {
    let port = free_port();
    let provider = Arc::new(IntrospectionProvider::new(Box::new(FakeMachine::running_default().with_memory_byte(0x10, 0xAB))));
    let html = Arc::new(HtmlRenderer::new(1, 2, 3, port));
    let listener = HttpListener::new(Topic::Memory, port, provider, html);
    listener.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let response = get(port, "/api?start=16&size=4", "");
    assert!(response.contains("\"start\":\"0010\""));
    assert!(response.contains("AB"));

    listener.stop();
}
