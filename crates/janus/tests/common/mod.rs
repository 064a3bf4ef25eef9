//! Shared fixtures for the orchestrator integration tests.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use janus::config::JanusConfig;
use janus::prelude::*;
use janus::registry::{
    BoxFuture, MemoryRegistry, Registry, RegistrationRecord, RegistryError,
};
use janus::server::{CachedResponse, ResponseCache};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Returns a loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A config with both listeners on loopback; a zero port stays disabled.
pub fn config(name: &str, grpc_port: u16, http_port: u16) -> JanusConfig {
    let mut config = JanusConfig::default();
    config.service.name = name.to_string();
    config.service.shutdown_timeout_secs = 2;
    config.grpc.host = "127.0.0.1".to_string();
    config.grpc.port = grpc_port;
    config.http.host = "127.0.0.1".to_string();
    config.http.port = http_port;
    config
}

/// Returns `true` if something accepts connections on `port`.
pub fn is_listening(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_ok()
}

/// Waits until `port` accepts connections.
pub async fn wait_for(port: u16) {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing listening on port {port}");
}

/// Serves `orchestrator` in the background.
pub fn spawn(
    orchestrator: Orchestrator,
    config: JanusConfig,
) -> (ShutdownSignal, JoinHandle<OrchestratorResult>) {
    let shutdown = ShutdownSignal::new();
    let handle = tokio::spawn(orchestrator.serve_with(config, shutdown.clone()));
    (shutdown, handle)
}

/// Triggers `shutdown` and waits for the serve call to return.
pub async fn stop(shutdown: ShutdownSignal, handle: JoinHandle<OrchestratorResult>) {
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("serve_with should return after shutdown")
        .unwrap()
        .unwrap();
}

/// An echo adapter: unary returns the body, streams echo every message.
pub fn echo() -> Arc<dyn MethodAdapter> {
    Arc::new(
        FnAdapter::new()
            .unary(|_ctx, body| async move { Ok(body) })
            .stream(|_ctx, mut conn| async move {
                while let Some(message) = conn.recv().await {
                    if conn.send(message).await.is_err() {
                        break;
                    }
                }
            }),
    )
}

/// An ordered log shared by the recording fixtures.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Wraps a [`MemoryRegistry`] and notes, at each deregistration, whether
/// the listeners are still accepting.
#[derive(Debug)]
pub struct WatchingRegistry {
    pub inner: MemoryRegistry,
    pub log: EventLog,
    pub ports: Vec<u16>,
}

impl WatchingRegistry {
    pub fn new(log: EventLog, ports: Vec<u16>) -> Self {
        Self {
            inner: MemoryRegistry::new(),
            log,
            ports,
        }
    }

    fn listening(&self) -> bool {
        self.ports.iter().all(|port| is_listening(*port))
    }
}

impl Registry for WatchingRegistry {
    fn register<'a>(
        &'a self,
        record: &'a RegistrationRecord,
    ) -> BoxFuture<'a, Result<(), RegistryError>> {
        self.log.lock().push(format!("register {}", record.id));
        self.inner.register(record)
    }

    fn deregister<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), RegistryError>> {
        let entry = format!("deregister {id} listening={}", self.listening());
        self.log.lock().push(entry);
        self.inner.deregister(id)
    }
}

/// A cache that records its close and whether the listeners were still
/// accepting at that point.
#[derive(Debug)]
pub struct WatchingCache {
    pub log: EventLog,
    pub ports: Vec<u16>,
}

impl ResponseCache for WatchingCache {
    fn get(&self, _key: &str) -> Option<CachedResponse> {
        None
    }

    fn put(&self, _key: String, _response: CachedResponse) {}

    fn close(&self) {
        let listening = self.ports.iter().any(|port| is_listening(*port));
        self.log.lock().push(format!("cache close listening={listening}"));
    }
}
