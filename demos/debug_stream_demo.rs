// debug-stream-demo: runs a DebugServer against a FakeMachine and feeds a
// synthetic instruction stream through the trace pipeline so the HTTP and
// push endpoints have something to show.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use debug_stream::test_support::FakeMachine;
use debug_stream::trace::{CpuSnapshotSource, TraceEntry};
use debug_stream::{DebugServer, ServerConfig};
use tracing::info;

struct CountingSource {
    pc: AtomicU16,
}

impl CpuSnapshotSource for CountingSource {
    fn capture(&self) -> TraceEntry {
        let pc = self.pc.fetch_add(1, Ordering::Relaxed);
        TraceEntry {
            pc,
            opcode_bytes: [0x00, 0, 0, 0],
            opcode_len: 1,
            valid: true,
            ..Default::default()
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "debug-stream-demo starting");

    let config = ServerConfig::default();
    info!(
        machine_port = config.machine_port.get(),
        io_port = config.io_port.get(),
        cpu_port = config.cpu_port.get(),
        memory_port = config.memory_port.get(),
        push_port = config.push_port.get(),
        "debug server listening"
    );

    let server = DebugServer::new("msx-demo", config, Box::new(FakeMachine::running_default()));
    let hook = server.emulation_hook();
    let source = CountingSource { pc: AtomicU16::new(0) };

    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let running_for_ctrlc = Arc::clone(&running);
    let _ = ctrlc_handler(move || running_for_ctrlc.store(false, Ordering::Release));

    while running.load(Ordering::Acquire) {
        hook.on_instruction(&source);
        std::thread::sleep(Duration::from_millis(10));
    }

    info!("debug-stream-demo shutting down");
}

/// No real signal handling here — the demo just loops until killed. Kept
/// as a named hook so a future revision can wire SIGINT without touching
/// the main loop shape.
fn ctrlc_handler(_on_signal: impl Fn() + Send + 'static) -> Result<(), ()> {
    Ok(())
}
