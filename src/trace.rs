//! `TraceEntry` and the emulation-thread call site that feeds the ring
//! buffer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ring::RingBuffer;

/// Capacity of the ring buffer shared between the emulation thread and the
/// trace worker. Usable capacity is one less (see `RingBuffer::capacity`).
pub const RING_CAPACITY: usize = 4096;

pub type TraceRing = RingBuffer<TraceEntry, RING_CAPACITY>;

/// Pre-captured CPU state plus up to four raw instruction bytes, submitted
/// through the SPSC ring for off-thread disassembly and encoding.
///
/// Trivially copyable: created once on the emulation thread right after an
/// instruction's opcode bytes are fetched, never mutated, consumed exactly
/// once by the trace worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceEntry {
    pub pc: u16,
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub opcode_bytes: [u8; 4],
    pub opcode_len: u8,
    pub valid: bool,
}

impl TraceEntry {
    #[must_use]
    pub fn opcode_slice(&self) -> &[u8] {
        let len = usize::from(self.opcode_len.clamp(0, 4));
        &self.opcode_bytes[..len]
    }
}

/// Anything that can hand the hook a fresh `TraceEntry` on the emulation
/// thread, with zero locking — same-thread register-file reads only.
pub trait CpuSnapshotSource {
    /// Read the current CPU state and pre-fetched opcode bytes. Must not
    /// block and must not touch memory beyond the already-decoded opcode
    /// buffer (no bus cycles, no peeks into shared state).
    fn capture(&self) -> TraceEntry;
}

/// The four per-topic streaming toggles from `ServerConfig`, held as
/// atomics so `DebugServer::reconcile` can update them without touching
/// the emulation thread.
#[derive(Debug, Default)]
pub struct StreamToggles {
    pub cpu: AtomicBool,
    pub mem: AtomicBool,
    pub io: AtomicBool,
    pub slot: AtomicBool,
}

impl StreamToggles {
    #[must_use]
    pub fn new(cpu: bool, mem: bool, io: bool, slot: bool) -> Arc<Self> {
        Arc::new(Self {
            cpu: AtomicBool::new(cpu),
            mem: AtomicBool::new(mem),
            io: AtomicBool::new(io),
            slot: AtomicBool::new(slot),
        })
    }

    pub fn set(&self, cpu: bool, mem: bool, io: bool, slot: bool) {
        self.cpu.store(cpu, Ordering::Relaxed);
        self.mem.store(mem, Ordering::Relaxed);
        self.io.store(io, Ordering::Relaxed);
        self.slot.store(slot, Ordering::Relaxed);
    }

    /// `true` if any of the four per-topic toggles is on.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.cpu.load(Ordering::Relaxed) || self.mem.load(Ordering::Relaxed) || self.io.load(Ordering::Relaxed) || self.slot.load(Ordering::Relaxed)
    }
}

/// Thin call site owned by the emulator's hot instruction loop.
///
/// Before or during instruction execution, if any of the per-topic
/// streaming toggles is on AND at least one push client is connected
/// (observed via a lazily-updated atomic flag), captures CPU state and
/// pushes it to the ring. A failed push (ring full) is silently dropped —
/// this is the documented backpressure policy, not an error.
pub struct EmulationHook {
    ring: Arc<TraceRing>,
    has_clients: Arc<AtomicBool>,
    toggles: Arc<StreamToggles>,
}

impl EmulationHook {
    #[must_use]
    pub fn new(ring: Arc<TraceRing>, has_clients: Arc<AtomicBool>, toggles: Arc<StreamToggles>) -> Self {
        Self { ring, has_clients, toggles }
    }

    /// Returns `true` if the entry was enqueued, `false` if nobody is
    /// listening, no streaming category is enabled (fast path, no ring
    /// touched), or the ring was full.
    #[inline]
    pub fn on_instruction(&self, source: &dyn CpuSnapshotSource) -> bool {
        if !self.toggles.any_enabled() || !self.has_clients.load(Ordering::Relaxed) {
            return false;
        }
        let entry = source.capture();
        self.ring.try_push(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(TraceEntry);
    impl CpuSnapshotSource for FixedSource {
        fn capture(&self) -> TraceEntry {
            self.0
        }
    }

    #[test]
    fn fast_path_skips_ring_when_no_clients() {
        let ring = Arc::new(TraceRing::new());
        let has_clients = Arc::new(AtomicBool::new(false));
        let toggles = StreamToggles::new(true, true, true, true);
        let hook = EmulationHook::new(Arc::clone(&ring), has_clients, toggles);
        let entry = TraceEntry {
            pc: 0x100,
            valid: true,
            ..Default::default()
        };
        assert!(!hook.on_instruction(&FixedSource(entry)));
        assert!(ring.is_empty());
    }

    #[test]
    fn pushes_when_streaming_and_clients_present() {
        let ring = Arc::new(TraceRing::new());
        let has_clients = Arc::new(AtomicBool::new(true));
        let toggles = StreamToggles::new(true, false, false, false);
        let hook = EmulationHook::new(Arc::clone(&ring), has_clients, toggles);
        let entry = TraceEntry {
            pc: 0x100,
            valid: true,
            ..Default::default()
        };
        assert!(hook.on_instruction(&FixedSource(entry)));
        assert_eq!(ring.size(), 1);
    }

    #[test]
    fn disabled_toggle_skips_even_with_clients() {
        let ring = Arc::new(TraceRing::new());
        let has_clients = Arc::new(AtomicBool::new(true));
        let toggles = StreamToggles::new(false, false, false, false);
        let hook = EmulationHook::new(Arc::clone(&ring), has_clients, toggles);
        let entry = TraceEntry::default();
        assert!(!hook.on_instruction(&FixedSource(entry)));
        assert!(ring.is_empty());
    }

    #[test]
    fn any_single_category_enabled_is_enough() {
        let ring = Arc::new(TraceRing::new());
        let has_clients = Arc::new(AtomicBool::new(true));
        let toggles = StreamToggles::new(false, false, true, false);
        let hook = EmulationHook::new(Arc::clone(&ring), has_clients, toggles);
        let entry = TraceEntry {
            pc: 0x200,
            valid: true,
            ..Default::default()
        };
        assert!(hook.on_instruction(&FixedSource(entry)));
    }

    #[test]
    fn toggles_update_live_after_construction() {
        let ring = Arc::new(TraceRing::new());
        let has_clients = Arc::new(AtomicBool::new(true));
        let toggles = StreamToggles::new(false, false, false, false);
        let hook = EmulationHook::new(Arc::clone(&ring), has_clients, Arc::clone(&toggles));
        let entry = TraceEntry {
            pc: 0x300,
            valid: true,
            ..Default::default()
        };
        assert!(!hook.on_instruction(&FixedSource(entry)));
        toggles.set(false, true, false, false);
        assert!(hook.on_instruction(&FixedSource(entry)));
    }

    #[test]
    fn opcode_slice_respects_len() {
        let entry = TraceEntry {
            opcode_bytes: [0xCB, 0x01, 0x02, 0x03],
            opcode_len: 2,
            ..Default::default()
        };
        assert_eq!(entry.opcode_slice(), &[0xCB, 0x01]);
    }
}
