//! Connects to a `PushListener` and verifies the fixed connect sequence:
//! Telnet negotiation bytes, then a `sys/conn/hello` line, then a full
//! snapshot ending once no more lines are pending.

use std::io::{BufRead, BufReader, Read};
use std::net::{TcpListener as StdTcpListener, TcpStream};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use debug_stream::push::PushListener;
use debug_stream::test_support::FakeMachine;
use debug_stream::{IntrospectionProvider, JsonLineFormatter};
use serde_json::Value;

fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn connect_sequence_is_negotiation_then_hello_then_snapshot() {
    let port = free_port();
    let formatter = Arc::new(JsonLineFormatter::new("msx"));
    let provider = Arc::new(IntrospectionProvider::new(Box::new(FakeMachine::running_default())));
    let has_clients = Arc::new(AtomicBool::new(false));
    let listener = PushListener::new(port, formatter, provider, has_clients);
    listener.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut negotiation = [0u8; 6];
    client.read_exact(&mut negotiation).unwrap();
    assert_eq!(negotiation, [0xFF, 0xFB, 0x01, 0xFF, 0xFB, 0x03]);

    let mut reader = BufReader::new(client);
    let mut hello_line = String::new();
    reader.read_line(&mut hello_line).unwrap();
    let hello: Value = serde_json::from_str(hello_line.trim_end()).unwrap();
    assert_eq!(hello["cat"], "sys");
    assert_eq!(hello["fld"], "hello");

    let mut snapshot_lines = Vec::new();
    for _ in 0..5 {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let doc: Value = serde_json::from_str(line.trim_end()).unwrap();
        snapshot_lines.push(doc);
    }
    assert_eq!(snapshot_lines[0]["fld"], "timestamp");
    assert!(snapshot_lines.iter().any(|l| l["cat"] == "mach" && l["fld"] == "id"));

    listener.stop();
}
