//! Verifies the documented backpressure policy: a full ring silently
//! drops the newest entry rather than blocking or panicking, and an
//! `EmulationHook` with no listeners never touches the ring at all.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use debug_stream::trace::{CpuSnapshotSource, StreamToggles, TraceEntry, TraceRing};
use debug_stream::EmulationHook;

struct FixedSource;
impl CpuSnapshotSource for FixedSource {
    fn capture(&self) -> TraceEntry {
        TraceEntry { valid: true, ..Default::default() }
    }
}

#[test]
fn full_ring_drops_without_panicking() {
    let ring = Arc::new(TraceRing::new());
    let has_clients = Arc::new(AtomicBool::new(true));
    let toggles = StreamToggles::new(true, false, false, false);
    let hook = EmulationHook::new(Arc::clone(&ring), has_clients, toggles);

    let capacity = ring.capacity();
    let mut accepted = 0;
    for _ in 0..(capacity * 2) {
        if hook.on_instruction(&FixedSource) {
            accepted += 1;
        }
    }

    assert_eq!(accepted, capacity, "only `capacity` entries should ever be accepted before drops begin");
    assert_eq!(ring.size(), capacity);
}

#[test]
fn no_listeners_never_touches_the_ring() {
    let ring = Arc::new(TraceRing::new());
    let has_clients = Arc::new(AtomicBool::new(false));
    let toggles = StreamToggles::new(true, false, false, false);
    let hook = EmulationHook::new(Arc::clone(&ring), has_clients, toggles);

    for _ in 0..1000 {
        assert!(!hook.on_instruction(&FixedSource));
    }
    assert!(ring.is_empty());
}
