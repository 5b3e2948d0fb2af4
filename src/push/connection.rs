//! Per-client Telnet-style push connection.
//!
//! Grounded on `DebugTelnetConnection` (see `original_source/src/debugger/
//! DebugTelnetConnection.cc`): negotiate, send the hello line and a full
//! snapshot, then idle-poll for disconnect until told to stop.

use std::io::Write;
use std::mem::MaybeUninit;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use socket2::SockRef;

use crate::format::JsonLineFormatter;
use crate::introspect::IntrospectionProvider;
use crate::poller::Poller;

/// `IAC WILL ECHO; IAC WILL SUPPRESS-GO-AHEAD`.
const TELNET_INIT: [u8; 6] = [0xFF, 0xFB, 0x01, 0xFF, 0xFB, 0x03];
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One accepted Telnet-style client. The socket lives behind a single
/// mutex: `stop()` takes the lock and `.take()`s it, which is both "mark
/// closed" and "make further sends fail" in one step — the same race
/// elimination the original gets from an atomic handle plus a send mutex.
pub struct PushConnection {
    socket: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
}

impl PushConnection {
    #[must_use]
    pub fn new(stream: TcpStream) -> Arc<Self> {
        Arc::new(Self {
            socket: Mutex::new(Some(stream)),
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.socket.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
    }

    /// Normalizes `line` to end in `\r\n`, then writes it under the send
    /// lock. Returns `false` (and marks the connection closed) on any
    /// write failure or if it was already closed.
    pub fn send(&self, line: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        let framed = frame_line(line);
        let mut guard = self.socket.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(stream) = guard.as_mut() else {
            return false;
        };
        if stream.write_all(framed.as_bytes()).is_err() {
            drop(guard);
            self.close();
            return false;
        }
        true
    }

    fn send_telnet_init(&self) -> bool {
        let mut guard = self.socket.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(stream) = guard.as_mut() else {
            return false;
        };
        if stream.write_all(&TELNET_INIT).is_err() {
            drop(guard);
            self.close();
            return false;
        }
        true
    }

    /// Runs the connection to completion: negotiate, send hello plus a
    /// full snapshot, then idle-poll for disconnect. Returns once the
    /// client disconnects or `poller` is aborted.
    pub fn run(self: &Arc<Self>, formatter: &JsonLineFormatter, provider: &IntrospectionProvider, poller: &Poller) {
        if !self.send_telnet_init() {
            return;
        }
        if !self.send(&formatter.hello()) {
            return;
        }
        let snapshot = provider.with_view(|view| formatter.full_snapshot(view));
        for line in &snapshot {
            if !self.send(line) {
                return;
            }
        }

        loop {
            if poller.is_aborted() || self.is_closed() {
                break;
            }
            std::thread::sleep(IDLE_POLL_INTERVAL);
            if peer_disconnected(self) {
                self.close();
                break;
            }
        }

        self.send(&formatter.goodbye());
    }
}

fn frame_line(line: &str) -> String {
    if let Some(stripped) = line.strip_suffix('\n') {
        if stripped.ends_with('\r') {
            line.to_string()
        } else {
            format!("{stripped}\r\n")
        }
    } else {
        format!("{line}\r\n")
    }
}

/// Same flip-to-nonblocking-and-peek idiom as the HTTP connection's SSE
/// loop, reused here for the push idle loop.
fn peer_disconnected(conn: &PushConnection) -> bool {
    let guard = conn.socket.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let Some(stream) = guard.as_ref() else {
        return true;
    };
    let sock = SockRef::from(stream);
    if sock.set_nonblocking(true).is_err() {
        return false;
    }
    let mut buf = [MaybeUninit::uninit(); 1];
    let result = sock.peek(&mut buf);
    let _ = sock.set_nonblocking(false);
    matches!(result, Ok(0))
}
