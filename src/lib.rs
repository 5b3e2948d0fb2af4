//! Live-debug streaming and introspection subsystem.
//!
//! Two independent data paths share one purpose: let an external tool
//! watch and query a running machine without slowing it down.
//!
//! - A real-time trace path: the emulation thread pushes a [`trace::TraceEntry`]
//!   per instruction into a lock-free [`ring::RingBuffer`]; an off-thread
//!   [`worker::TraceWorker`] drains it, disassembles, and fans it out over
//!   Server-Sent Events and a line-oriented push socket.
//! - An on-demand introspection path: [`introspect::IntrospectionProvider`]
//!   answers point-in-time HTTP queries about machine/IO/CPU/memory state.
//!
//! [`server::DebugServer`] owns the lifecycle of both: four per-topic HTTP
//! listeners and one push listener, reconciled against a [`config::ServerConfig`].

pub mod config;
pub mod error;
pub mod format;
pub mod html;
pub mod http;
pub mod introspect;
pub mod poller;
pub mod push;
pub mod ring;
pub mod server;
pub mod topic;
pub mod trace;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::{DebugPort, ServerConfig};
pub use error::{DebugServerError, Result};
pub use format::JsonLineFormatter;
pub use introspect::{EmulatorView, IntrospectionProvider};
pub use ring::RingBuffer;
pub use server::DebugServer;
pub use topic::Topic;
pub use trace::{EmulationHook, TraceEntry};
