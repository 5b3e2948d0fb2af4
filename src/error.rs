//! Crate-wide error type.
//!
//! Per the failure model: the only fallible public entry points are the
//! listener `start()` methods (bind/listen failures). Everything else
//! (malformed requests, disconnects, a full ring buffer) is handled inline
//! and never escapes as an `Err` — see `DebugServerError` variant docs.

use crate::Topic;

/// Errors that can cross a public API boundary of this crate.
#[derive(Debug, thiserror::Error)]
pub enum DebugServerError {
    /// `bind`/`listen` failed for one of the per-topic HTTP listeners or the
    /// push listener. The controller logs this and leaves that listener
    /// down; other listeners are unaffected.
    #[error("failed to start {topic} listener on 127.0.0.1:{port}: {source}")]
    StartupFailure {
        topic: Topic,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A listener was asked to start while already running.
    #[error("{topic} listener is already running")]
    AlreadyRunning { topic: Topic },
}

pub type Result<T> = std::result::Result<T, DebugServerError>;
