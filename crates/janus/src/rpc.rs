//! RPC side: server options, the mounted service set and the serve loop.

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use janus_server::ShutdownSignal;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tonic::body::BoxBody;
use tonic::codegen::Service;
use tonic::server::NamedService;
use tonic::service::Routes;
use tonic::transport::server::Router;
use tonic::transport::Server;

use crate::error::OrchestratorError;

/// A tonic server knob, applied in declaration order when the RPC server is
/// built.
#[derive(Clone)]
pub enum ServerOption {
    /// Maximum in-flight requests per connection.
    ConcurrencyLimit(usize),
    /// Per-request deadline.
    Timeout(Duration),
    /// `TCP_NODELAY` on accepted connections. The last one declared wins.
    TcpNodelay(bool),
    /// HTTP/2 keep-alive ping interval.
    Http2KeepaliveInterval(Duration),
    /// HTTP/2 keep-alive ping timeout.
    Http2KeepaliveTimeout(Duration),
    /// Maximum concurrent HTTP/2 streams per connection.
    MaxConcurrentStreams(u32),
    /// Any other builder adjustment.
    Custom(Arc<dyn Fn(Server) -> Server + Send + Sync>),
}

impl ServerOption {
    /// Wraps a builder closure.
    pub fn custom(f: impl Fn(Server) -> Server + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    fn apply(&self, server: Server) -> Server {
        match self {
            Self::ConcurrencyLimit(limit) => server.concurrency_limit_per_connection(*limit),
            Self::Timeout(timeout) => server.timeout(*timeout),
            Self::TcpNodelay(enabled) => server.tcp_nodelay(*enabled),
            Self::Http2KeepaliveInterval(interval) => server.http2_keepalive_interval(Some(*interval)),
            Self::Http2KeepaliveTimeout(timeout) => server.http2_keepalive_timeout(Some(*timeout)),
            Self::MaxConcurrentStreams(max) => server.max_concurrent_streams(Some(*max)),
            Self::Custom(f) => f(server),
        }
    }
}

impl fmt::Debug for ServerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConcurrencyLimit(limit) => f.debug_tuple("ConcurrencyLimit").field(limit).finish(),
            Self::Timeout(timeout) => f.debug_tuple("Timeout").field(timeout).finish(),
            Self::TcpNodelay(enabled) => f.debug_tuple("TcpNodelay").field(enabled).finish(),
            Self::Http2KeepaliveInterval(interval) => {
                f.debug_tuple("Http2KeepaliveInterval").field(interval).finish()
            }
            Self::Http2KeepaliveTimeout(timeout) => {
                f.debug_tuple("Http2KeepaliveTimeout").field(timeout).finish()
            }
            Self::MaxConcurrentStreams(max) => f.debug_tuple("MaxConcurrentStreams").field(max).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// The set of RPC services mounted on the server.
///
/// Handed to the RPC augmentor after every declared service is mounted.
#[derive(Default)]
pub struct RpcServices {
    routes: Routes,
    names: Vec<&'static str>,
}

impl fmt::Debug for RpcServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServices").field("names", &self.names).finish_non_exhaustive()
    }
}

impl RpcServices {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts `service`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::DuplicateRpcService`] if a service with the
    /// same name is already mounted.
    pub fn add_service<S>(&mut self, service: S) -> Result<&mut Self, OrchestratorError>
    where
        S: Service<http::Request<BoxBody>, Response = http::Response<BoxBody>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        if self.contains(S::NAME) {
            return Err(OrchestratorError::DuplicateRpcService(S::NAME.to_string()));
        }
        self.routes = std::mem::take(&mut self.routes).add_service(service);
        self.names.push(S::NAME);
        Ok(self)
    }

    /// Returns `true` if a service named `name` is mounted.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| *n == name)
    }

    /// Returns the mounted service names in mount order.
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    /// Returns the number of mounted services.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// An RPC server that is bound but not yet serving.
pub(crate) struct PendingRpc {
    router: Router,
    listener: TcpListener,
    local_addr: SocketAddr,
    nodelay: bool,
}

impl fmt::Debug for PendingRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRpc")
            .field("local_addr", &self.local_addr)
            .field("nodelay", &self.nodelay)
            .finish_non_exhaustive()
    }
}

/// Builds the server from `options`, in order, and mounts `services`.
pub(crate) fn build_router(options: &[ServerOption], services: RpcServices) -> Router {
    let mut server = options
        .iter()
        .fold(Server::builder(), |server, option| option.apply(server));
    server.add_routes(services.routes)
}

impl PendingRpc {
    /// Binds `addr` for `router`. Nothing is accepted until [`serve`](Self::serve).
    pub(crate) async fn bind(addr: &str, router: Router, nodelay: bool) -> Result<Self, OrchestratorError> {
        let bind_error = |source| OrchestratorError::ListenerBind {
            protocol: "grpc",
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        Ok(Self {
            router,
            listener,
            local_addr,
            nodelay,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until `stop` fires, then drains in-flight calls.
    pub(crate) async fn serve(self, stop: ShutdownSignal) -> Result<(), tonic::transport::Error> {
        let nodelay = self.nodelay;
        let incoming = TcpListenerStream::new(self.listener).map(move |conn| {
            conn.and_then(|stream| {
                stream.set_nodelay(nodelay)?;
                Ok(stream)
            })
        });

        self.router
            .serve_with_incoming_shutdown(incoming, async move {
                stop.recv().await;
            })
            .await
    }
}

/// Resolves `TCP_NODELAY` for a listener we accept on ourselves.
pub(crate) fn tcp_nodelay(options: &[ServerOption]) -> bool {
    options
        .iter()
        .rev()
        .find_map(|option| match option {
            ServerOption::TcpNodelay(enabled) => Some(*enabled),
            _ => None,
        })
        .unwrap_or(true)
}
