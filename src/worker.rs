//! `TraceWorker` — the single consumer of the trace ring buffer.
//!
//! Grounded on the consumer loop implied by `DebugStreamFormatter`'s
//! trace-emitting methods (see `original_source/src/debugger/
//! DebugStreamFormatter.cc`, `formatTraceExec`/`formatCPURegisters`) plus
//! the thread roster in the broader debugger design: one background
//! thread drains the ring, disassembles, formats, and broadcasts, sleeping
//! briefly whenever the ring is empty.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::format::JsonLineFormatter;
use crate::push::PushListener;
use crate::trace::{TraceEntry, TraceRing};

/// How many drained entries pass between refreshes of the worker's cached
/// `has_clients` snapshot.
const CLIENT_REFRESH_EVERY: u32 = 100;
const IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Maps a just-fetched opcode's raw bytes to its instruction length.
/// `None` means "no mapping" — the worker then assumes length 1, per the
/// documented fallback for an unintegrated disassembler.
pub trait OpcodeLengthTable: Send + Sync {
    fn length_of(&self, bytes: &[u8]) -> Option<u8>;
}

/// Always defers to the length-1 fallback. Stand-in until a real opcode
/// table is wired in by an integration.
#[derive(Debug, Default)]
pub struct DefaultOpcodeLengthTable;

impl OpcodeLengthTable for DefaultOpcodeLengthTable {
    fn length_of(&self, _bytes: &[u8]) -> Option<u8> {
        None
    }
}

/// Turns `length` raw bytes at `addr` into a textual mnemonic.
pub trait Disassembler: Send + Sync {
    fn disassemble(&self, addr: u16, bytes: &[u8]) -> String;
}

/// Renders `db XX YY ...` rather than a real mnemonic. Per-opcode
/// disassembly tables are out of scope here; an integration supplies its
/// own `Disassembler`.
#[derive(Debug, Default)]
pub struct PlaceholderDisassembler;

impl Disassembler for PlaceholderDisassembler {
    fn disassemble(&self, _addr: u16, bytes: &[u8]) -> String {
        format!("db {bytes:02X?}")
    }
}

/// Drains [`TraceRing`], turning each [`TraceEntry`] into a `dbg/trace/exec`
/// line followed by a `cpu/reg/all` line, broadcast through a
/// [`PushListener`]. Runs on its own thread; `stop()` drains whatever is
/// left in the ring before returning.
pub struct TraceWorker {
    ring: Arc<TraceRing>,
    formatter: Arc<JsonLineFormatter>,
    push: Arc<PushListener>,
    length_table: Arc<dyn OpcodeLengthTable>,
    disassembler: Arc<dyn Disassembler>,
    running: Arc<AtomicBool>,
    thread: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl TraceWorker {
    #[must_use]
    pub fn new(ring: Arc<TraceRing>, formatter: Arc<JsonLineFormatter>, push: Arc<PushListener>) -> Self {
        Self::with_tables(ring, formatter, push, Arc::new(DefaultOpcodeLengthTable), Arc::new(PlaceholderDisassembler))
    }

    #[must_use]
    pub fn with_tables(
        ring: Arc<TraceRing>,
        formatter: Arc<JsonLineFormatter>,
        push: Arc<PushListener>,
        length_table: Arc<dyn OpcodeLengthTable>,
        disassembler: Arc<dyn Disassembler>,
    ) -> Self {
        Self {
            ring,
            formatter,
            push,
            length_table,
            disassembler,
            running: Arc::new(AtomicBool::new(false)),
            thread: std::sync::Mutex::new(None),
        }
    }

    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let ring = Arc::clone(&self.ring);
        let formatter = Arc::clone(&self.formatter);
        let push = Arc::clone(&self.push);
        let length_table = Arc::clone(&self.length_table);
        let disassembler = Arc::clone(&self.disassembler);
        let running = Arc::clone(&self.running);

        let handle = std::thread::spawn(move || run_loop(&ring, &formatter, &push, &*length_table, &*disassembler, &running));
        *self.thread.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
    }

    /// Signals the worker to stop after draining whatever remains in the
    /// ring, then joins its thread.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.thread.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take() {
            let _ = handle.join();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for TraceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn process(entry: &TraceEntry, formatter: &JsonLineFormatter, push: &PushListener, length_table: &dyn OpcodeLengthTable, disassembler: &dyn Disassembler) {
    if push.client_count() == 0 {
        return;
    }
    let bytes = entry.opcode_slice();
    let length = (length_table.length_of(bytes).unwrap_or(1).max(1) as usize).min(bytes.len());
    let disasm = disassembler.disassemble(entry.pc, &bytes[..length]);

    push.broadcast(&formatter.trace_exec(entry.pc, &disasm));
    let regs = entry.into();
    push.broadcast(&formatter.cpu_reg_all(&regs));
}

fn run_loop(
    ring: &TraceRing,
    formatter: &JsonLineFormatter,
    push: &PushListener,
    length_table: &dyn OpcodeLengthTable,
    disassembler: &dyn Disassembler,
    running: &AtomicBool,
) {
    let mut iterations: u32 = 0;
    let mut has_clients = push.client_count() > 0;
    while running.load(Ordering::Acquire) {
        iterations += 1;
        if iterations % CLIENT_REFRESH_EVERY == 0 {
            has_clients = push.client_count() > 0;
        }
        if !has_clients {
            std::thread::sleep(IDLE_SLEEP);
            continue;
        }
        if let Some(entry) = ring.try_pop() {
            process(&entry, formatter, push, length_table, disassembler);
        } else {
            std::thread::sleep(IDLE_SLEEP);
        }
    }

    while let Some(entry) = ring.try_pop() {
        process(&entry, formatter, push, length_table, disassembler);
    }
}

impl From<&TraceEntry> for crate::introspect::CpuRegisters {
    fn from(entry: &TraceEntry) -> Self {
        Self {
            af: entry.af,
            bc: entry.bc,
            de: entry.de,
            hl: entry.hl,
            ix: entry.ix,
            iy: entry.iy,
            sp: entry.sp,
            pc: entry.pc,
            ..Default::default()
        }
    }
}
