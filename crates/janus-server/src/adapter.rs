//! Method adapters: the seam between HTTP and RPC semantics.
//!
//! A [`MethodAdapter`] turns a collected HTTP body into one method call and
//! the result back into bytes. For persistent connections it owns the
//! message loop over the upgraded socket. [`FnAdapter`] builds one from
//! closures.
//!
//! # Example
//!
//! ```rust
//! use janus_server::FnAdapter;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Ping { seq: u32 }
//!
//! #[derive(Serialize)]
//! struct Pong { seq: u32 }
//!
//! let adapter = FnAdapter::new().json(|_ctx, req: Ping| async move {
//!     Ok(Pong { seq: req.seq + 1 })
//! });
//! # let _ = adapter;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tonic::{Code, Status};

use crate::middleware::{Endpoint, EndpointKind};
use crate::socket::SocketConn;
use crate::types::{json_response, BoxFuture, HttpRequest, HttpResponse, PathParams};

/// What an adapter knows about the call it serves.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Method tag given at declaration.
    pub tag: String,
    /// Request path as received.
    pub path: String,
    /// Captured path parameters.
    pub params: PathParams,
    /// Request headers.
    pub headers: HeaderMap,
}

impl CallContext {
    /// Builds the context for `request` routed to the method `tag`.
    pub fn from_request(tag: &str, request: &HttpRequest) -> Self {
        Self {
            tag: tag.to_string(),
            path: request.uri().path().to_string(),
            params: request
                .extensions()
                .get::<PathParams>()
                .cloned()
                .unwrap_or_default(),
            headers: request.headers().clone(),
        }
    }
}

/// Converts HTTP traffic into method invocations.
pub trait MethodAdapter: Send + Sync + 'static {
    /// Invokes the method once with a request body.
    fn call<'a>(&'a self, ctx: CallContext, body: Bytes) -> BoxFuture<'a, Result<Bytes, Status>>;

    /// Runs the message loop of an upgraded connection.
    ///
    /// The default closes the connection immediately.
    fn stream<'a>(&'a self, ctx: CallContext, conn: SocketConn) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            tracing::debug!(tag = %ctx.tag, "Method has no stream handler, closing connection");
            conn.close().await;
        })
    }
}

type UnaryFn = Arc<dyn Fn(CallContext, Bytes) -> BoxFuture<'static, Result<Bytes, Status>> + Send + Sync>;
type StreamFn = Arc<dyn Fn(CallContext, SocketConn) -> BoxFuture<'static, ()> + Send + Sync>;

/// A [`MethodAdapter`] assembled from closures.
#[derive(Clone, Default)]
pub struct FnAdapter {
    unary: Option<UnaryFn>,
    stream: Option<StreamFn>,
}

impl fmt::Debug for FnAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAdapter")
            .field("unary", &self.unary.is_some())
            .field("stream", &self.stream.is_some())
            .finish()
    }
}

impl FnAdapter {
    /// Creates an adapter with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the raw unary handler.
    pub fn unary<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(CallContext, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, Status>> + Send + 'static,
    {
        self.unary = Some(Arc::new(move |ctx, body| Box::pin(handler(ctx, body))));
        self
    }

    /// Sets a unary handler that speaks JSON on both sides.
    ///
    /// An empty body decodes as `{}`. A body that does not decode yields
    /// `INVALID_ARGUMENT` without invoking the handler.
    pub fn json<Req, Resp, F, Fut>(self, handler: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        self.unary(move |ctx, body: Bytes| {
            let call = decode_json::<Req>(&body).map(|req| handler(ctx, req));
            async move {
                let response = call?.await?;
                serde_json::to_vec(&response)
                    .map(Bytes::from)
                    .map_err(|e| Status::internal(format!("failed to encode response: {e}")))
            }
        })
    }

    /// Sets the persistent-connection handler.
    pub fn stream<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(CallContext, SocketConn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stream = Some(Arc::new(move |ctx, conn| Box::pin(handler(ctx, conn))));
        self
    }
}

impl MethodAdapter for FnAdapter {
    fn call<'a>(&'a self, ctx: CallContext, body: Bytes) -> BoxFuture<'a, Result<Bytes, Status>> {
        match &self.unary {
            Some(handler) => handler(ctx, body),
            None => Box::pin(async move {
                Err(Status::unimplemented(format!(
                    "method '{}' has no unary handler",
                    ctx.tag
                )))
            }),
        }
    }

    fn stream<'a>(&'a self, ctx: CallContext, conn: SocketConn) -> BoxFuture<'a, ()> {
        match &self.stream {
            Some(handler) => handler(ctx, conn),
            None => Box::pin(async move {
                tracing::debug!(tag = %ctx.tag, "Method has no stream handler, closing connection");
                conn.close().await;
            }),
        }
    }
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, Status> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| Status::invalid_argument(format!("invalid JSON body: {e}")))
}

/// Maps an RPC status code to the HTTP status a gateway would answer with.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            StatusCode::BAD_REQUEST
        }
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::Unknown | Code::Internal | Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Encodes an RPC error as `{"code": <int>, "message": ..}`.
pub fn status_response(status: &Status) -> HttpResponse {
    let body = serde_json::json!({
        "code": status.code() as i32,
        "message": status.message(),
    });
    json_response(http_status(status.code()), body.to_string())
}

/// Terminal endpoint for a unary route.
pub struct UnaryEndpoint {
    tag: String,
    adapter: Arc<dyn MethodAdapter>,
}

impl UnaryEndpoint {
    /// Binds `adapter` under the method `tag`.
    pub fn new(tag: impl Into<String>, adapter: Arc<dyn MethodAdapter>) -> Self {
        Self {
            tag: tag.into(),
            adapter,
        }
    }
}

impl Endpoint for UnaryEndpoint {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        Box::pin(async move {
            let ctx = CallContext::from_request(&self.tag, &request);
            match self.adapter.call(ctx, request.into_body()).await {
                Ok(body) => json_response(StatusCode::OK, body),
                Err(status) => {
                    tracing::debug!(
                        tag = %self.tag,
                        code = ?status.code(),
                        message = %status.message(),
                        "Method call failed"
                    );
                    status_response(&status)
                }
            }
        })
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Unary
    }
}
