//! Typed server configuration and a settings-change observer.
//!
//! Grounded on the `Setting`/`Observer<Setting>` pattern used to drive
//! `DebugHttpServer` (see `original_source/src/settings/GlobalSettings.cc`):
//! here expressed as plain data (`ServerConfig`) plus a callback list
//! (`ConfigWatcher`) rather than an inheritance-based observer hierarchy.

use std::fmt;
use std::sync::{Arc, Mutex};

/// A TCP port validated to be outside the well-known/reserved range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DebugPort(u16);

impl DebugPort {
    pub const RANGE: std::ops::RangeInclusive<u16> = 1024..=65535;

    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }
}

/// A port outside `1024..=65535`.
#[derive(Debug, thiserror::Error)]
#[error("port {0} is outside the valid debug port range 1024..=65535")]
pub struct InvalidPort(pub u16);

impl TryFrom<u16> for DebugPort {
    type Error = InvalidPort;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if DebugPort::RANGE.contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidPort(value))
        }
    }
}

impl fmt::Display for DebugPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default startup ports, grounded on the doc-comment values in
/// `original_source/src/debugger/DebugHttpServer.hh`.
pub const DEFAULT_MACHINE_PORT: u16 = 65501;
pub const DEFAULT_IO_PORT: u16 = 65502;
pub const DEFAULT_CPU_PORT: u16 = 65503;
pub const DEFAULT_MEMORY_PORT: u16 = 65504;
pub const DEFAULT_PUSH_PORT: u16 = 65505;

/// Everything a [`crate::server::DebugServer`] needs to decide which
/// listeners to run and on which ports. Mutated by the embedding
/// application's settings layer; observed via [`ConfigWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_enable: bool,
    pub machine_port: DebugPort,
    pub io_port: DebugPort,
    pub cpu_port: DebugPort,
    pub memory_port: DebugPort,
    pub push_enable: bool,
    pub push_port: DebugPort,
    pub stream_cpu: bool,
    pub stream_mem: bool,
    pub stream_io: bool,
    pub stream_slot: bool,
}

impl ServerConfig {
    /// `false` for a fresh `ServerConfig` with everything disabled except
    /// the trace categories (see [`Self::default`]).
    #[must_use]
    pub fn http_ports_differ(&self, other: &Self) -> bool {
        self.http_enable != other.http_enable
            || self.machine_port != other.machine_port
            || self.io_port != other.io_port
            || self.cpu_port != other.cpu_port
            || self.memory_port != other.memory_port
    }

    #[must_use]
    pub fn push_settings_differ(&self, other: &Self) -> bool {
        self.push_enable != other.push_enable || self.push_port != other.push_port
    }

    #[must_use]
    pub fn stream_settings_differ(&self, other: &Self) -> bool {
        self.stream_cpu != other.stream_cpu || self.stream_mem != other.stream_mem || self.stream_io != other.stream_io || self.stream_slot != other.stream_slot
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_enable: true,
            machine_port: DebugPort::try_from(DEFAULT_MACHINE_PORT).expect("in range"),
            io_port: DebugPort::try_from(DEFAULT_IO_PORT).expect("in range"),
            cpu_port: DebugPort::try_from(DEFAULT_CPU_PORT).expect("in range"),
            memory_port: DebugPort::try_from(DEFAULT_MEMORY_PORT).expect("in range"),
            push_enable: true,
            push_port: DebugPort::try_from(DEFAULT_PUSH_PORT).expect("in range"),
            stream_cpu: true,
            stream_mem: true,
            stream_io: true,
            stream_slot: true,
        }
    }
}

type ChangeCallback = Box<dyn FnMut(&ServerConfig, &ServerConfig) + Send + 'static>;

/// Fires every registered callback whenever [`Self::set`] installs a
/// config that differs from the last one. Stands in for the original's
/// `Observer<Setting>::update` without requiring a real settings registry.
#[derive(Default)]
pub struct ConfigWatcher {
    current: Mutex<ServerConfig>,
    callbacks: Mutex<Vec<ChangeCallback>>,
}

impl ConfigWatcher {
    #[must_use]
    pub fn new(initial: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(initial),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    pub fn on_change(&self, callback: impl FnMut(&ServerConfig, &ServerConfig) + Send + 'static) {
        self.callbacks.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(Box::new(callback));
    }

    #[must_use]
    pub fn current(&self) -> ServerConfig {
        *self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Installs `next` and notifies every watcher with `(old, new)`, but
    /// only if it actually changed.
    pub fn set(&self, next: ServerConfig) {
        let old = {
            let mut current = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if *current == next {
                return;
            }
            let old = *current;
            *current = next;
            old
        };
        let mut callbacks = self.callbacks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for callback in callbacks.iter_mut() {
            callback(&old, &next);
        }
    }
}
