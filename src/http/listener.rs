//! Accept loop for one topic's HTTP debug port.
//!
//! Grounded on `DebugHttpServerPort` (see `original_source/src/debugger/
//! DebugHttpServerPort.cc`): bind loopback-only with `SO_REUSEADDR`, run a
//! non-blocking accept loop gated by a [`Poller`], spawn one thread per
//! connection, periodically reap finished ones.

use std::net::{TcpListener as StdTcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use socket2::{Domain, Socket, Type};

use crate::error::{DebugServerError, Result};
use crate::html::HtmlRenderer;
use crate::introspect::IntrospectionProvider;
use crate::poller::Poller;
use crate::topic::Topic;

use super::connection::HttpConnection;

struct Slot {
    shutdown: TcpStream,
    thread: JoinHandle<()>,
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

/// Owns the listening socket for one [`Topic`] and the connections it has
/// accepted. `stop()` joins the accept thread and every connection thread
/// it spawned.
pub struct HttpListener {
    topic: Topic,
    port: u16,
    provider: Arc<IntrospectionProvider>,
    html: Arc<HtmlRenderer>,
    poller: Arc<Poller>,
    running: AtomicBool,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
    connections: Arc<Mutex<Vec<Slot>>>,
}

impl HttpListener {
    #[must_use]
    pub fn new(topic: Topic, port: u16, provider: Arc<IntrospectionProvider>, html: Arc<HtmlRenderer>) -> Self {
        Self {
            topic,
            port,
            provider,
            html,
            poller: Arc::new(Poller::new()),
            running: AtomicBool::new(false),
            accept_thread: Mutex::new(None),
            connections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn topic(&self) -> Topic {
        self.topic
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(DebugServerError::AlreadyRunning { topic: self.topic });
        }

        let listener = bind_loopback(self.port).map_err(|source| {
            self.running.store(false, Ordering::Release);
            DebugServerError::StartupFailure { topic: self.topic, port: self.port, source }
        })?;

        let topic = self.topic;
        let provider = Arc::clone(&self.provider);
        let html = Arc::clone(&self.html);
        let poller = Arc::clone(&self.poller);
        let connections = Arc::clone(&self.connections);

        let handle = std::thread::spawn(move || accept_loop(listener, topic, provider, html, poller, connections));
        *self.accept_thread.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Aborts the accept loop, then force-closes every still-open
    /// connection (so one blocked in its read timeout doesn't hold up
    /// shutdown) before joining every thread.
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
            let _ = slot.shutdown.shutdown(std::net::Shutdown::Both);
            let _ = slot.thread.join();
        }
    }
}

impl Drop for HttpListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: StdTcpListener,
    topic: Topic,
    provider: Arc<IntrospectionProvider>,
    html: Arc<HtmlRenderer>,
    poller: Arc<Poller>,
    connections: Arc<Mutex<Vec<Slot>>>,
) {
    loop {
        if poller.is_aborted() {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                spawn_connection(topic, Arc::clone(&provider), Arc::clone(&html), Arc::clone(&poller), stream, &connections);
                reap_finished(&connections);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                poller.wait_tick();
            }
            Err(_) => {
                poller.wait_tick();
            }
        }
    }
}

fn spawn_connection(
    topic: Topic,
    provider: Arc<IntrospectionProvider>,
    html: Arc<HtmlRenderer>,
    poller: Arc<Poller>,
    stream: TcpStream,
    connections: &Arc<Mutex<Vec<Slot>>>,
) {
    let Ok(shutdown) = stream.try_clone() else {
        return;
    };
    let thread = std::thread::spawn(move || {
        let connection = HttpConnection::new(topic, provider, html);
        connection.serve(stream, &poller);
    });
    connections.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(Slot { shutdown, thread });
}

fn reap_finished(connections: &Arc<Mutex<Vec<Slot>>>) {
    let mut connections = connections.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let mut i = 0;
    while i < connections.len() {
        if connections[i].thread.is_finished() {
            let slot = connections.swap_remove(i);
            let _ = slot.thread.join();
        } else {
            i += 1;
        }
    }
}
