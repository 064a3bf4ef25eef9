//! # Janus Server
//!
//! The HTTP half of a Janus process.
//!
//! - [`RouteTable`] - declaration-time routes, groups and middleware
//! - [`compile`] - turns a table into an immutable [`HttpApp`]
//! - [`UnaryEndpoint`] / [`SocketEndpoint`] - terminal handlers backed by a
//!   [`MethodAdapter`]
//! - [`SocketUpgrader`] - WebSocket handshake shared by persistent routes
//! - [`ResponseCache`] / [`MemoryCache`] - response cache used by the `cache` plugin
//! - [`HttpListener`] - hyper accept loop, plain or TLS, with graceful drain
//! - [`ShutdownSignal`] - stop/restart trigger shared across tasks
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use janus_server::{compile, CompileOptions, FnAdapter, RouteTable, UnaryEndpoint};
//!
//! let echo = FnAdapter::new().unary(|_ctx, body| async move { Ok(body) });
//!
//! let mut table = RouteTable::new();
//! table
//!     .group("/echo", Vec::new())
//!     .post("/say", Vec::new(), Arc::new(UnaryEndpoint::new("Say", Arc::new(echo))));
//!
//! let app = compile(table, &CompileOptions::default(), None).unwrap();
//! assert_eq!(app.route_count(), 1);
//! ```

#![doc(html_root_url = "https://docs.rs/janus-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod adapter;
mod cache;
mod compile;
mod health;
mod middleware;
mod plugin;
mod router;
mod server;
mod shutdown;
mod socket;
mod tls;
mod types;

pub use adapter::{http_status, status_response, CallContext, FnAdapter, MethodAdapter, UnaryEndpoint};
pub use cache::{new_cache, CacheStats, CachedResponse, MemoryCache, ResponseCache};
pub use compile::{compile, CompileError, CompileOptions, HttpApp};
pub use health::{add_health_route, HealthEndpoint, HEALTH_PATH};
pub use middleware::{endpoint_fn, Endpoint, EndpointKind, FnEndpoint, Middleware, Next};
pub use plugin::{AccessLog, CacheLayer, ACCESS_LOG_PLUGIN, CACHE_HIT_HEADER, CACHE_PLUGIN};
pub use router::{join_path, Group, RouteInfo, RouteTable};
pub use server::{HttpListener, ServeError};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownReason, ShutdownSignal};
pub use socket::{
    compute_accept_key, is_websocket_request, SocketConn, SocketEndpoint, SocketError, SocketMessage,
    SocketUpgrader,
};
pub use tls::{load_tls_acceptor, TlsError};
pub use types::{
    error_response, json_response, not_found, response, BoxFuture, HttpRequest, HttpResponse, PathParams,
    ResponseBody,
};

/// Re-export of the TLS acceptor type returned by [`load_tls_acceptor`].
pub use tokio_rustls::TlsAcceptor;
