//! Builds a full `DebugServer` against free ports, exercises one HTTP
//! endpoint and the push endpoint, then lets `Drop` tear everything down.

use std::io::{Read, Write};
use std::net::{TcpListener as StdTcpListener, TcpStream};
use std::time::Duration;

use debug_stream::config::DebugPort;
use debug_stream::test_support::FakeMachine;
use debug_stream::{DebugServer, ServerConfig};

fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn config_on_free_ports() -> ServerConfig {
    ServerConfig {
        machine_port: DebugPort::try_from(free_port()).unwrap(),
        io_port: DebugPort::try_from(free_port()).unwrap(),
        cpu_port: DebugPort::try_from(free_port()).unwrap(),
        memory_port: DebugPort::try_from(free_port()).unwrap(),
        push_port: DebugPort::try_from(free_port()).unwrap(),
        ..ServerConfig::default()
    }
}

#[test]
fn server_serves_http_and_push_then_shuts_down_cleanly() {
    let config = config_on_free_ports();
    let machine_port = config.machine_port.get();
    let push_port = config.push_port.get();

    let server = DebugServer::new("msx", config, Box::new(FakeMachine::running_default()));
    std::thread::sleep(Duration::from_millis(80));

    let mut http = TcpStream::connect(("127.0.0.1", machine_port)).unwrap();
    http.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    http.write_all(b"GET /api HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let mut response = String::new();
    http.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));

    let mut push = TcpStream::connect(("127.0.0.1", push_port)).unwrap();
    push.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut negotiation = [0u8; 6];
    push.read_exact(&mut negotiation).unwrap();
    assert_eq!(negotiation, [0xFF, 0xFB, 0x01, 0xFF, 0xFB, 0x03]);

    drop(server);
}

#[test]
fn disabling_push_in_config_tears_down_the_push_listener() {
    let config = config_on_free_ports();
    let push_port = config.push_port.get();

    let server = DebugServer::new("msx", config, Box::new(FakeMachine::running_default()));
    std::thread::sleep(Duration::from_millis(80));

    let mut next = config;
    next.push_enable = false;
    server.apply_config(next);
    std::thread::sleep(Duration::from_millis(100));

    let result = TcpStream::connect_timeout(&format!("127.0.0.1:{push_port}").parse().unwrap(), Duration::from_millis(300));
    assert!(result.is_err(), "push listener should no longer accept connections once disabled");

    drop(server);
}
