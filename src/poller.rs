//! A small abortable wait gate for accept loops.
//!
//! The original C++ design uses an OS `poll(2)` wrapper that a shutdown
//! path can wake with `abort()`. Rust's std `TcpListener` has no portable
//! equivalent, so accept loops here run the listener non-blocking and use
//! `Poller` purely as the shutdown signal: check `is_aborted()` after every
//! `WouldBlock`, sleeping a short, bounded interval between checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long an accept loop sleeps between non-blocking `accept()` attempts
/// while waiting for a connection or a shutdown signal.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
pub struct Poller {
    aborted: AtomicBool,
}

impl Poller {
    #[must_use]
    pub fn new() -> Self {
        Self {
            aborted: AtomicBool::new(false),
        }
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Block for up to `ACCEPT_POLL_INTERVAL`, returning early (well, not
    /// really early — `thread::sleep` can't be interrupted portably) but
    /// the short interval keeps shutdown latency bounded.
    pub fn wait_tick(&self) {
        std::thread::sleep(ACCEPT_POLL_INTERVAL);
    }
}
