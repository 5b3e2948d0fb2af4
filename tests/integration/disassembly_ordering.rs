//! Feeds several `TraceEntry`s through the ring and a `TraceWorker`, and
//! checks two ordering guarantees: entries surface in the order they were
//! pushed, and each entry's `dbg/trace/exec` line precedes its
//! `cpu/reg/all` line.

use std::io::{BufRead, BufReader, Read};
use std::net::{TcpListener as StdTcpListener, TcpStream};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use debug_stream::push::PushListener;
use debug_stream::test_support::FakeMachine;
use debug_stream::trace::TraceEntry;
use debug_stream::worker::TraceWorker;
use debug_stream::{IntrospectionProvider, JsonLineFormatter};
use serde_json::Value;

fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn exec_lines_preserve_push_order_and_precede_their_reg_dump() {
    let port = free_port();
    let formatter = Arc::new(JsonLineFormatter::new("msx"));
    let provider = Arc::new(IntrospectionProvider::new(Box::new(FakeMachine::running_default())));
    let has_clients = Arc::new(AtomicBool::new(false));
    let push = Arc::new(PushListener::new(port, Arc::clone(&formatter), provider, has_clients));
    push.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut negotiation = [0u8; 6];
    client.read_exact(&mut negotiation).unwrap();
    std::thread::sleep(Duration::from_millis(50)); // let hello+snapshot drain

    let ring = Arc::new(debug_stream::trace::TraceRing::new());
    let worker = TraceWorker::new(Arc::clone(&ring), formatter, Arc::clone(&push));
    worker.start();

    let addrs = [0x1000u16, 0x1001, 0x1002];
    for &pc in &addrs {
        assert!(ring.try_push(TraceEntry {
            pc,
            opcode_bytes: [0x00, 0, 0, 0],
            opcode_len: 1,
            valid: true,
            ..Default::default()
        }));
    }

    let mut reader = BufReader::new(client);
    // Skip whatever hello/snapshot lines are still buffered.
    let mut line = String::new();
    loop {
        line.clear();
        reader.read_line(&mut line).unwrap();
        let doc: Value = serde_json::from_str(line.trim_end()).unwrap();
        if doc["cat"] == "dbg" {
            break;
        }
    }

    let mut seen_pcs = Vec::new();
    let first: Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(first["sec"], "trace");
    seen_pcs.push(u16::from_str_radix(first["addr"].as_str().unwrap(), 16).unwrap());

    let mut reg_line = String::new();
    reader.read_line(&mut reg_line).unwrap();
    let reg: Value = serde_json::from_str(reg_line.trim_end()).unwrap();
    assert_eq!(reg["sec"], "reg");
    assert_eq!(reg["fld"], "all");

    for _ in 0..(addrs.len() - 1) {
        let mut exec_line = String::new();
        reader.read_line(&mut exec_line).unwrap();
        let exec: Value = serde_json::from_str(exec_line.trim_end()).unwrap();
        assert_eq!(exec["sec"], "trace");
        seen_pcs.push(u16::from_str_radix(exec["addr"].as_str().unwrap(), 16).unwrap());

        let mut skip = String::new();
        reader.read_line(&mut skip).unwrap(); // matching cpu/reg/all
    }

    assert_eq!(seen_pcs, addrs, "instructions must surface in program order");

    worker.stop();
    push.stop();
}
