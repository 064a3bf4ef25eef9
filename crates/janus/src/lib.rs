//! # Janus
//!
//! One process, two faces: a tonic RPC listener and a hyper HTTP listener,
//! declared together, registered together and stopped together.
//!
//! ## Lifecycle
//!
//! ```text
//! merge config ─► RPC: options ─► services ─► augmentor ─► register ─► bind
//!              └► HTTP: middleware ─► routes ─► augmentor ─► /health + register
//!                       ─► cache ─► compile ─► bind
//!              ─► serve both ─► wait for shutdown/restart
//!              ─► deregister ─► stop RPC ─► stop HTTP ─► close cache ─► (re-exec)
//! ```
//!
//! A port of `0` disables its listener; with both disabled, serving is a
//! no-op. Setup failures are returned before either listener accepts a
//! connection. A listener that fails after it started terminates the process.
//!
//! ## Registry records
//!
//! With `service.name = "svc"`, the HTTP listener is registered twice, as
//! `svc.http` and `svc`, and the RPC listener once, as `svc.grpc`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use janus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), OrchestratorError> {
//!     let mut orchestrator = Orchestrator::new();
//!
//!     let echo = FnAdapter::new()
//!         .unary(|_ctx, body| async move { Ok(body) })
//!         .stream(|_ctx, mut conn| async move {
//!             while let Some(message) = conn.recv().await {
//!                 if conn.send(message).await.is_err() {
//!                     break;
//!                 }
//!             }
//!         });
//!
//!     let mut service = orchestrator.declare_http_service("echo");
//!     service.group("/echo", Vec::new());
//!     service
//!         .method("Echo", Arc::new(echo))
//!         .handle("/say")
//!         .socket("/stream");
//!
//!     orchestrator.serve().await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/janus/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod health;
mod lifecycle;
mod orchestrator;
mod restart;
mod routes;
mod rpc;
mod service;

pub use error::{OrchestratorError, OrchestratorResult};
pub use health::{health_service, HealthResponder, HEALTH_SERVICE_NAME};
pub use orchestrator::{
    CacheFactory, Orchestrator, RoutesAugmentor, RpcAugmentor, CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE,
    ENV_PREFIX,
};
pub use rpc::{RpcServices, ServerOption};
pub use service::{MethodHandle, ServiceHandle};

// Re-export the building blocks
pub use janus_config as config;
pub use janus_registry as registry;
pub use janus_server as server;
pub use janus_telemetry as telemetry;

/// Everything needed to declare and serve.
pub mod prelude {
    pub use crate::{
        MethodHandle, Orchestrator, OrchestratorError, OrchestratorResult, RpcServices, ServerOption,
        ServiceHandle,
    };
    pub use janus_config::JanusConfig;
    pub use janus_server::{
        CallContext, FnAdapter, MethodAdapter, Middleware, Next, RouteTable, ShutdownReason, ShutdownSignal,
        SocketConn, SocketMessage,
    };
}
