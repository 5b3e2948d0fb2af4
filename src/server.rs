//! `DebugServer` — top-level lifecycle controller.
//!
//! Grounded on `DebugHttpServer` (see `original_source/src/debugger/
//! DebugHttpServer.cc`): owns every listener, the trace worker, the
//! formatter and provider, and reconciles them against configuration
//! changes delivered through a [`ConfigWatcher`].

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::{info, warn};

use crate::config::{ConfigWatcher, ServerConfig};
use crate::format::JsonLineFormatter;
use crate::html::HtmlRenderer;
use crate::introspect::{EmulatorView, IntrospectionProvider};
use crate::push::PushListener;
use crate::topic::Topic;
use crate::trace::{EmulationHook, StreamToggles, TraceRing};
use crate::worker::TraceWorker;
use crate::Result;

struct HttpListeners {
    machine: crate::http::HttpListener,
    io: crate::http::HttpListener,
    cpu: crate::http::HttpListener,
    memory: crate::http::HttpListener,
}

fn build_html_renderer(config: &ServerConfig) -> Arc<HtmlRenderer> {
    Arc::new(HtmlRenderer::new(
        config.machine_port.get(),
        config.io_port.get(),
        config.cpu_port.get(),
        config.memory_port.get(),
    ))
}

impl HttpListeners {
    fn build(config: &ServerConfig, provider: &Arc<IntrospectionProvider>, html: &Arc<HtmlRenderer>) -> Self {
        Self {
            machine: crate::http::HttpListener::new(Topic::Machine, config.machine_port.get(), Arc::clone(provider), Arc::clone(html)),
            io: crate::http::HttpListener::new(Topic::Io, config.io_port.get(), Arc::clone(provider), Arc::clone(html)),
            cpu: crate::http::HttpListener::new(Topic::Cpu, config.cpu_port.get(), Arc::clone(provider), Arc::clone(html)),
            memory: crate::http::HttpListener::new(Topic::Memory, config.memory_port.get(), Arc::clone(provider), Arc::clone(html)),
        }
    }

    fn start_all(&self) -> Result<()> {
        self.machine.start()?;
        self.io.start()?;
        self.cpu.start()?;
        self.memory.start()?;
        Ok(())
    }

    fn stop_all(&self) {
        self.machine.stop();
        self.io.stop();
        self.cpu.stop();
        self.memory.stop();
    }
}

/// Owns the full set of debug listeners plus the trace worker for one
/// emulator instance. Construction attaches a config observer and, per the
/// initial [`ServerConfig`], starts whichever listeners are enabled.
/// `Drop` performs the mandated teardown order: worker, then push
/// listener, then HTTP listeners.
pub struct DebugServer {
    provider: Arc<IntrospectionProvider>,
    formatter: Arc<JsonLineFormatter>,
    html: std::sync::Mutex<Arc<HtmlRenderer>>,
    http: std::sync::Mutex<HttpListeners>,
    push: std::sync::Mutex<Arc<PushListener>>,
    worker: std::sync::Mutex<Arc<TraceWorker>>,
    ring: Arc<TraceRing>,
    has_clients: Arc<AtomicBool>,
    stream_toggles: Arc<StreamToggles>,
    watcher: Arc<ConfigWatcher>,
}

impl DebugServer {
    /// Builds every listener and the worker against `config`, attaches a
    /// config-change reconciliation callback, then starts whatever the
    /// initial config enables. `machine` becomes the sole [`EmulatorView`]
    /// the provider and formatter consult.
    #[must_use]
    pub fn new(emu_id: impl Into<String>, config: ServerConfig, machine: Box<dyn EmulatorView>) -> Arc<Self> {
        let provider = Arc::new(IntrospectionProvider::new(machine));
        let formatter = Arc::new(JsonLineFormatter::new(emu_id));
        let html = build_html_renderer(&config);
        let ring = Arc::new(TraceRing::new());
        let has_clients = Arc::new(AtomicBool::new(false));
        let stream_toggles = StreamToggles::new(config.stream_cpu, config.stream_mem, config.stream_io, config.stream_slot);

        let http = HttpListeners::build(&config, &provider, &html);
        let push = Arc::new(PushListener::new(config.push_port.get(), Arc::clone(&formatter), Arc::clone(&provider), Arc::clone(&has_clients)));
        let worker = Arc::new(TraceWorker::new(Arc::clone(&ring), Arc::clone(&formatter), Arc::clone(&push)));

        let server = Arc::new(Self {
            provider,
            formatter,
            html: std::sync::Mutex::new(html),
            http: std::sync::Mutex::new(http),
            push: std::sync::Mutex::new(push),
            worker: std::sync::Mutex::new(worker),
            ring,
            has_clients,
            stream_toggles,
            watcher: ConfigWatcher::new(config),
        });

        if config.http_enable {
            if let Err(e) = server.http.lock().unwrap_or_else(std::sync::PoisonError::into_inner).start_all() {
                warn!(error = %e, "failed to start HTTP debug listeners");
            }
        }
        if config.push_enable {
            if let Err(e) = server.push.lock().unwrap_or_else(std::sync::PoisonError::into_inner).start() {
                warn!(error = %e, "failed to start push debug listener");
            } else {
                server.worker.lock().unwrap_or_else(std::sync::PoisonError::into_inner).start();
            }
        }

        // Weak, not Arc: a strong callback would create `server -> watcher
        // -> callback -> server` and leak every instance.
        let reconcile_target = Arc::downgrade(&server);
        server.watcher.on_change(move |old, new| {
            if let Some(server) = reconcile_target.upgrade() {
                server.reconcile(old, new);
            }
        });

        server
    }

    /// A handle an emulation thread can hold and call `on_instruction` on
    /// without ever touching the rest of this struct.
    #[must_use]
    pub fn emulation_hook(&self) -> EmulationHook {
        EmulationHook::new(Arc::clone(&self.ring), Arc::clone(&self.has_clients), Arc::clone(&self.stream_toggles))
    }

    #[must_use]
    pub fn config_watcher(&self) -> Arc<ConfigWatcher> {
        Arc::clone(&self.watcher)
    }

    pub fn apply_config(&self, next: ServerConfig) {
        self.watcher.set(next);
    }

    fn reconcile(&self, old: &ServerConfig, new: &ServerConfig) {
        if old.http_ports_differ(new) {
            info!("HTTP debug configuration changed, restarting listeners");
            let html = build_html_renderer(new);
            *self.html.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::clone(&html);

            let mut http = self.http.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            http.stop_all();
            *http = HttpListeners::build(new, &self.provider, &html);
            if new.http_enable {
                if let Err(e) = http.start_all() {
                    warn!(error = %e, "failed to restart HTTP debug listeners");
                }
            }
        }

        if old.push_settings_differ(new) {
            info!("push debug configuration changed, restarting push listener and worker");
            self.worker.lock().unwrap_or_else(std::sync::PoisonError::into_inner).stop();
            self.push.lock().unwrap_or_else(std::sync::PoisonError::into_inner).stop();

            let push = Arc::new(PushListener::new(new.push_port.get(), Arc::clone(&self.formatter), Arc::clone(&self.provider), Arc::clone(&self.has_clients)));
            let worker = Arc::new(TraceWorker::new(Arc::clone(&self.ring), Arc::clone(&self.formatter), Arc::clone(&push)));

            if new.push_enable {
                if let Err(e) = push.start() {
                    warn!(error = %e, "failed to restart push debug listener");
                } else {
                    worker.start();
                }
            }
            *self.push.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = push;
            *self.worker.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = worker;
        }

        if old.stream_settings_differ(new) {
            info!("per-topic streaming configuration changed");
            self.stream_toggles.set(new.stream_cpu, new.stream_mem, new.stream_io, new.stream_slot);
        }
    }
}

impl Drop for DebugServer {
    fn drop(&mut self) {
        self.worker.lock().unwrap_or_else(std::sync::PoisonError::into_inner).stop();
        self.push.lock().unwrap_or_else(std::sync::PoisonError::into_inner).stop();
        self.http.lock().unwrap_or_else(std::sync::PoisonError::into_inner).stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebugPort;
    use crate::test_support::FakeMachine;
    use std::net::TcpListener as StdTcpListener;
    use std::time::Duration;

    fn free_port() -> u16 {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn config_with_free_ports() -> ServerConfig {
        ServerConfig {
            machine_port: DebugPort::try_from(free_port()).unwrap(),
            io_port: DebugPort::try_from(free_port()).unwrap(),
            cpu_port: DebugPort::try_from(free_port()).unwrap(),
            memory_port: DebugPort::try_from(free_port()).unwrap(),
            push_port: DebugPort::try_from(free_port()).unwrap(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn construction_starts_http_and_push_when_enabled() {
        let config = config_with_free_ports();
        let cpu_port = config.cpu_port.get();
        let server = DebugServer::new("msx", config, Box::new(FakeMachine::running_default()));
        std::thread::sleep(Duration::from_millis(50));

        let mut stream = std::net::TcpStream::connect(("127.0.0.1", cpu_port)).unwrap();
        use std::io::Write;
        stream.write_all(b"GET /api HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();

        drop(server);
    }

    #[test]
    fn http_port_change_restarts_listeners_on_new_ports() {
        let config = config_with_free_ports();
        let server = DebugServer::new("msx", config, Box::new(FakeMachine::running_default()));
        std::thread::sleep(Duration::from_millis(50));

        let new_cpu_port = free_port();
        let mut next = config;
        next.cpu_port = DebugPort::try_from(new_cpu_port).unwrap();
        server.apply_config(next);
        std::thread::sleep(Duration::from_millis(100));

        let stream = std::net::TcpStream::connect(("127.0.0.1", new_cpu_port));
        assert!(stream.is_ok());

        drop(server);
    }
}
