//! Persistent-connection upgrade (RFC 6455 WebSocket).
//!
//! One [`SocketUpgrader`] is shared by every persistent route of an
//! application. It validates the handshake, answers `101 Switching
//! Protocols` and hands the upgraded connection to the route's adapter on
//! a separate task.

use std::future::Future;
use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::{header, Request, StatusCode};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use janus_config::SocketConfig;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use crate::adapter::{CallContext, MethodAdapter};
use crate::middleware::{Endpoint, EndpointKind};
use crate::types::{response, BoxFuture, HttpRequest, HttpResponse, ResponseBody};

/// The WebSocket magic GUID used in the handshake.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Check if a request is a WebSocket upgrade request.
///
/// A valid WebSocket upgrade request must have:
/// - `Connection: Upgrade` header
/// - `Upgrade: websocket` header
/// - `Sec-WebSocket-Key` header
/// - `Sec-WebSocket-Version: 13` header
pub fn is_websocket_request<B>(request: &Request<B>) -> bool {
    let headers = request.headers();
    let header_str = |name: header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    header_str(header::CONNECTION).is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"))
        && header_str(header::UPGRADE).is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
        && header_str(header::SEC_WEBSOCKET_KEY).is_some_and(|v| !v.is_empty())
        && header_str(header::SEC_WEBSOCKET_VERSION) == Some("13")
}

/// Compute the Sec-WebSocket-Accept value from the key.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Errors on an upgraded connection.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The connection is already closed.
    #[error("connection closed")]
    Closed,

    /// Framing or transport error.
    #[error("socket protocol error: {0}")]
    Protocol(#[from] tungstenite::Error),
}

/// A data message on an upgraded connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Bytes),
}

impl SocketMessage {
    /// Returns the payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }
}

/// The server side of an upgraded connection.
///
/// Control frames are handled underneath: pings are answered, and a close
/// frame from the peer ends [`recv`](Self::recv).
pub struct SocketConn {
    stream: WebSocketStream<TokioIo<Upgraded>>,
    closed: bool,
}

impl std::fmt::Debug for SocketConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketConn")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl SocketConn {
    fn new(stream: WebSocketStream<TokioIo<Upgraded>>) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Returns `true` once the peer or this side closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Receives the next data message.
    ///
    /// Returns `None` when the connection is closed or fails.
    pub async fn recv(&mut self) -> Option<SocketMessage> {
        if self.closed {
            return None;
        }

        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(SocketMessage::Text(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => return Some(SocketMessage::Binary(data)),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Socket receive failed");
                    break;
                }
            }
        }

        self.closed = true;
        None
    }

    /// Sends a data message.
    pub async fn send(&mut self, message: SocketMessage) -> Result<(), SocketError> {
        if self.closed {
            return Err(SocketError::Closed);
        }

        let frame = match message {
            SocketMessage::Text(text) => Message::text(text),
            SocketMessage::Binary(data) => Message::binary(data),
        };
        self.stream.send(frame).await.map_err(SocketError::from)
    }

    /// Sends a text message.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), SocketError> {
        self.send(SocketMessage::Text(text.into())).await
    }

    /// Closes the connection with a normal close frame.
    pub async fn close(mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "Socket close failed");
        }
    }
}

/// Upgrades requests to persistent connections.
#[derive(Debug, Clone)]
pub struct SocketUpgrader {
    config: WebSocketConfig,
}

impl SocketUpgrader {
    /// Creates an upgrader with the configured frame and message limits.
    pub fn new(config: &SocketConfig) -> Self {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(config.max_message_size);
        ws_config.max_frame_size = Some(config.max_frame_size);
        Self { config: ws_config }
    }

    /// Answers the handshake and runs `on_conn` on the upgraded connection.
    ///
    /// Returns `400` when `request` is not a WebSocket upgrade. Otherwise
    /// returns `101`; `on_conn` runs on its own task once hyper hands over
    /// the connection.
    pub fn upgrade<F, Fut>(&self, request: &mut HttpRequest, on_conn: F) -> HttpResponse
    where
        F: FnOnce(SocketConn) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !is_websocket_request(request) {
            return response(
                StatusCode::BAD_REQUEST,
                "text/plain",
                "expected a WebSocket upgrade request",
            );
        }

        let accept_key = request
            .headers()
            .get(header::SEC_WEBSOCKET_KEY)
            .and_then(|v| v.to_str().ok())
            .map(compute_accept_key)
            .unwrap_or_default();

        let on_upgrade = hyper::upgrade::on(&mut *request);
        let config = self.config.clone();
        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let stream =
                        WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, Some(config))
                            .await;
                    on_conn(SocketConn::new(stream)).await;
                }
                Err(e) => warn!(error = %e, "Connection upgrade failed"),
            }
        });

        let mut switching = http::Response::new(ResponseBody::default());
        *switching.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        let headers = switching.headers_mut();
        headers.insert(header::CONNECTION, header::HeaderValue::from_static("Upgrade"));
        headers.insert(header::UPGRADE, header::HeaderValue::from_static("websocket"));
        if let Ok(value) = header::HeaderValue::from_str(&accept_key) {
            headers.insert(header::SEC_WEBSOCKET_ACCEPT, value);
        }
        switching
    }
}

/// Terminal endpoint for a persistent-connection route.
pub struct SocketEndpoint {
    tag: String,
    adapter: Arc<dyn MethodAdapter>,
    upgrader: Arc<SocketUpgrader>,
}

impl SocketEndpoint {
    /// Binds `adapter` under `tag`, upgrading through the shared `upgrader`.
    pub fn new(tag: impl Into<String>, adapter: Arc<dyn MethodAdapter>, upgrader: Arc<SocketUpgrader>) -> Self {
        Self {
            tag: tag.into(),
            adapter,
            upgrader,
        }
    }

    /// Returns the shared upgrader.
    pub fn upgrader(&self) -> &Arc<SocketUpgrader> {
        &self.upgrader
    }
}

impl Endpoint for SocketEndpoint {
    fn call(&self, mut request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        let ctx = CallContext::from_request(&self.tag, &request);
        let adapter = Arc::clone(&self.adapter);
        let response = self.upgrader.upgrade(&mut request, move |conn| async move {
            adapter.stream(ctx, conn).await;
        });
        Box::pin(async move { response })
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Socket
    }
}
