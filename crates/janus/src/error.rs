//! Orchestrator errors.

use std::io;

use janus_config::ConfigError;
use janus_server::{CompileError, TlsError};
use thiserror::Error;

/// Errors returned by [`Orchestrator::serve_with`](crate::Orchestrator::serve_with).
///
/// Every variant is a setup failure: it is returned before either listener
/// accepts a connection. Registry failures are logged, never returned, and
/// a listener that fails after it started serving terminates the process.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A listener could not bind its address.
    #[error("failed to bind {protocol} listener on {addr}: {source}")]
    ListenerBind {
        /// `"grpc"` or `"http"`.
        protocol: &'static str,
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The HTTP handler graph could not be compiled.
    #[error("failed to compile HTTP routes: {0}")]
    Compilation(#[from] CompileError),

    /// The HTTP certificate or key could not be loaded.
    #[error("failed to load TLS material: {0}")]
    Tls(#[from] TlsError),

    /// Two RPC services share a fully qualified name.
    #[error("RPC service '{0}' is mounted more than once")]
    DuplicateRpcService(String),

    /// The replacement process could not be started.
    #[error("failed to restart: {0}")]
    Restart(#[source] io::Error),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T = ()> = Result<T, OrchestratorError>;
