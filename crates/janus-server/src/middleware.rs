//! Middleware trait and chain execution.
//!
//! Each compiled route carries a flattened middleware chain in a fixed
//! order: global, plugin, group, method. [`Next`] walks that chain and
//! finally calls the route's [`Endpoint`].
//!
//! # Example
//!
//! ```rust
//! use janus_server::{BoxFuture, HttpRequest, HttpResponse, Middleware, Next};
//!
//! struct RequestId;
//!
//! impl Middleware for RequestId {
//!     fn name(&self) -> &'static str {
//!         "request-id"
//!     }
//!
//!     fn process<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> BoxFuture<'a, HttpResponse> {
//!         Box::pin(async move {
//!             let mut response = next.run(request).await;
//!             response.headers_mut().insert("x-request-id", "42".parse().unwrap());
//!             response
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::types::{BoxFuture, HttpRequest, HttpResponse};

/// What a route is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Request/response call into a method adapter.
    Unary,
    /// Persistent connection upgraded from the request.
    Socket,
    /// The liveness endpoint.
    Health,
    /// Anything else, typically added by a routes augmentor.
    Custom,
}

/// The terminal handler of a route.
pub trait Endpoint: Send + Sync + 'static {
    /// Handles a request that passed through the middleware chain.
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse>;

    /// Returns what kind of endpoint this is.
    fn kind(&self) -> EndpointKind {
        EndpointKind::Custom
    }
}

/// A request processing stage.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the middleware name, used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request, usually delegating to `next`.
    fn process<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> BoxFuture<'a, HttpResponse>;
}

/// The remainder of a middleware chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Creates the head of a chain ending in `endpoint`.
    pub fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the remaining middleware, then the endpoint.
    pub async fn run(self, request: HttpRequest) -> HttpResponse {
        match self.chain.split_first() {
            Some((middleware, rest)) => {
                let next = Next {
                    chain: rest,
                    endpoint: self.endpoint,
                };
                middleware.process(request, next).await
            }
            None => self.endpoint.call(request).await,
        }
    }
}

/// An [`Endpoint`] backed by an async closure.
pub struct FnEndpoint<F> {
    func: F,
}

impl<F> FnEndpoint<F> {
    /// Wraps `func`.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Endpoint for FnEndpoint<F>
where
    F: Fn(HttpRequest) -> BoxFuture<'static, HttpResponse> + Send + Sync + 'static,
{
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        (self.func)(request)
    }
}

/// Shorthand for an `Arc`'d [`FnEndpoint`].
pub fn endpoint_fn<F>(func: F) -> Arc<dyn Endpoint>
where
    F: Fn(HttpRequest) -> BoxFuture<'static, HttpResponse> + Send + Sync + 'static,
{
    Arc::new(FnEndpoint::new(func))
}
