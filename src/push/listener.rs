//! Accept loop and broadcaster for push (Telnet-style) clients.
//!
//! Grounded on `DebugTelnetServer` (see `original_source/src/debugger/
//! DebugTelnetServer.cc`): same bind/accept-loop shape as the HTTP
//! listener, plus `broadcast()`, a live client count, and an
//! `on_client_connect` callback used to wake the emulation hook's "someone
//! is listening" flag.

use std::net::{TcpListener as StdTcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use socket2::{Domain, Socket, Type};

use crate::error::{DebugServerError, Result};
use crate::format::JsonLineFormatter;
use crate::introspect::IntrospectionProvider;
use crate::poller::Poller;
use crate::topic::Topic;

use super::connection::PushConnection;

/// How many accept-loop `WouldBlock` ticks pass between sweeps of closed
/// connections, even when no new client arrives.
const CLEANUP_EVERY_N_TICKS: u32 = 10;

struct Slot {
    conn: Arc<PushConnection>,
    thread: JoinHandle<()>,
}

/// Owns every accepted push connection and the count of currently-open
/// ones. `has_clients` is shared with [`crate::trace::EmulationHook`]:
/// it flips true when the first client connects, false once the last one
/// is swept.
pub struct PushListener {
    port: u16,
    formatter: Arc<JsonLineFormatter>,
    provider: Arc<IntrospectionProvider>,
    has_clients: Arc<AtomicBool>,
    client_count: Arc<AtomicUsize>,
    poller: Arc<Poller>,
    running: AtomicBool,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    connections: Arc<Mutex<Vec<Slot>>>,
    on_client_connect: Arc<dyn Fn() + Send + Sync>,
}

fn bind_loopback(port: u16) -> std::io::Result<StdTcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

impl PushListener {
    #[must_use]
    pub fn new(
        port: u16,
        formatter: Arc<JsonLineFormatter>,
        provider: Arc<IntrospectionProvider>,
        has_clients: Arc<AtomicBool>,
    ) -> Self {
        Self {
            port,
            formatter,
            provider,
            has_clients,
            client_count: Arc::new(AtomicUsize::new(0)),
            poller: Arc::new(Poller::new()),
            running: AtomicBool::new(false),
            accept_thread: Mutex::new(None),
            connections: Arc::new(Mutex::new(Vec::new())),
            on_client_connect: Arc::new(|| {}),
        }
    }

    /// Installs a callback invoked synchronously on the accept thread
    /// right after each new connection is registered. Must be set before
    /// [`Self::start`].
    pub fn set_on_client_connect(&mut self, callback: impl Fn() + Send + Sync + 'static) {
        self.on_client_connect = Arc::new(callback);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.client_count.load(Ordering::Acquire)
    }

    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(DebugServerError::AlreadyRunning { topic: Topic::Push });
        }

        let listener = bind_loopback(self.port).map_err(|source| {
            self.running.store(false, Ordering::Release);
            DebugServerError::StartupFailure { topic: Topic::Push, port: self.port, source }
        })?;

        let formatter = Arc::clone(&self.formatter);
        let provider = Arc::clone(&self.provider);
        let has_clients = Arc::clone(&self.has_clients);
        let client_count = Arc::clone(&self.client_count);
        let poller = Arc::clone(&self.poller);
        let connections = Arc::clone(&self.connections);
        let on_client_connect = Arc::clone(&self.on_client_connect);

        let handle = std::thread::spawn(move || {
            accept_loop(listener, formatter, provider, has_clients, client_count, poller, connections, on_client_connect);
        });
        *self.accept_thread.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.poller.abort();

        if let Some(handle) = self.accept_thread.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take() {
            let _ = handle.join();
        }
        let mut connections = self.connections.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for slot in connections.drain(..) {
            slot.conn.close();
            let _ = slot.thread.join();
        }
        self.client_count.store(0, Ordering::Release);
        self.has_clients.store(false, Ordering::Release);
    }

    /// Sends `line` to every connected client, normalizing once and
    /// marking any that error as closed. Closed connections are reaped on
    /// the next cleanup pass, not inline here.
    pub fn broadcast(&self, line: &str) {
        let connections = self.connections.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for slot in connections.iter() {
            slot.conn.send(line);
        }
    }
}

impl Drop for PushListener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn accept_loop(
    listener: StdTcpListener,
    formatter: Arc<JsonLineFormatter>,
    provider: Arc<IntrospectionProvider>,
    has_clients: Arc<AtomicBool>,
    client_count: Arc<AtomicUsize>,
    poller: Arc<Poller>,
    connections: Arc<Mutex<Vec<Slot>>>,
    on_client_connect: Arc<dyn Fn() + Send + Sync>,
) {
    let mut idle_ticks: u32 = 0;
    loop {
        if poller.is_aborted() {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                spawn_connection(
                    Arc::clone(&formatter),
                    Arc::clone(&provider),
                    Arc::clone(&poller),
                    stream,
                    &connections,
                    &client_count,
                    &has_clients,
                );
                on_client_connect();
                reap_closed(&connections, &client_count, &has_clients);
                idle_ticks = 0;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                idle_ticks += 1;
                if idle_ticks >= CLEANUP_EVERY_N_TICKS {
                    reap_closed(&connections, &client_count, &has_clients);
                    idle_ticks = 0;
                }
                poller.wait_tick();
            }
            Err(_) => {
                poller.wait_tick();
            }
        }
    }
}

fn spawn_connection(
    formatter: Arc<JsonLineFormatter>,
    provider: Arc<IntrospectionProvider>,
    poller: Arc<Poller>,
    stream: TcpStream,
    connections: &Arc<Mutex<Vec<Slot>>>,
    client_count: &Arc<AtomicUsize>,
    has_clients: &Arc<AtomicBool>,
) {
    let conn = PushConnection::new(stream);
    let thread_conn = Arc::clone(&conn);
    let thread = std::thread::spawn(move || {
        thread_conn.run(&formatter, &provider, &poller);
    });
    connections.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(Slot { conn, thread });
    client_count.fetch_add(1, Ordering::AcqRel);
    has_clients.store(true, Ordering::Release);
}

fn reap_closed(connections: &Arc<Mutex<Vec<Slot>>>, client_count: &Arc<AtomicUsize>, has_clients: &Arc<AtomicBool>) {
    let mut connections = connections.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let mut i = 0;
    while i < connections.len() {
        if connections[i].conn.is_closed() || connections[i].thread.is_finished() {
            let slot = connections.swap_remove(i);
            slot.conn.close();
            let _ = slot.thread.join();
        } else {
            i += 1;
        }
    }
    let remaining = connections.len();
    client_count.store(remaining, Ordering::Release);
    if remaining == 0 {
        has_clients.store(false, Ordering::Release);
    }
}
