//! The HTTP listener.
//!
//! [`HttpListener::bind`] is separate from [`HttpListener::serve`] so that
//! binding can fail during setup, before anything serves. Serving runs the
//! accept loop until the stop signal fires, then asks every open
//! connection to finish its in-flight request and waits for them, up to the
//! drain timeout.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use janus_server::{add_health_route, compile, CompileOptions, HttpListener, RouteTable, ShutdownSignal};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut table = RouteTable::new();
//! add_health_route(&mut table);
//! let app = Arc::new(compile(table, &CompileOptions::default(), None)?);
//!
//! let listener = HttpListener::bind("127.0.0.1:8080", None, None).await?;
//! let stop = ShutdownSignal::new();
//! listener.serve(app, stop, Duration::from_secs(30)).await?;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::{Request, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use socket2::{SockRef, TcpKeepalive};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::compile::HttpApp;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::types::{error_response, HttpResponse};

/// Pause after a transient accept failure.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Errors from the HTTP listener.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The accept loop failed and cannot continue.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// A bound HTTP listener, optionally TLS-wrapped.
pub struct HttpListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    keep_alive: Option<Duration>,
    tls: Option<TlsAcceptor>,
}

impl std::fmt::Debug for HttpListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpListener")
            .field("local_addr", &self.local_addr)
            .field("keep_alive", &self.keep_alive)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl HttpListener {
    /// Binds `addr`.
    ///
    /// `keep_alive` enables TCP keep-alive on accepted sockets; `tls` wraps
    /// every accepted connection.
    pub async fn bind(
        addr: &str,
        keep_alive: Option<Duration>,
        tls: Option<TlsAcceptor>,
    ) -> Result<Self, ServeError> {
        let bind_error = |source| ServeError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        Ok(Self {
            listener,
            local_addr,
            keep_alive,
            tls,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns `true` if connections are TLS-wrapped.
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Serves `app` until `stop` fires.
    ///
    /// Transient accept failures are logged and retried. Any other accept
    /// failure ends the loop with [`ServeError::Accept`].
    pub async fn serve(
        self,
        app: Arc<HttpApp>,
        stop: ShutdownSignal,
        drain_timeout: Duration,
    ) -> Result<(), ServeError> {
        let Self {
            listener,
            local_addr,
            keep_alive,
            tls,
        } = self;
        let tracker = ConnectionTracker::new();

        info!(addr = %local_addr, tls = tls.is_some(), "HTTP listener serving");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            configure_stream(&stream, keep_alive);

                            let app = Arc::clone(&app);
                            let token = tracker.acquire();
                            let stop = stop.clone();
                            let tls = tls.clone();

                            tokio::spawn(async move {
                                let result = match tls {
                                    Some(acceptor) => match acceptor.accept(stream).await {
                                        Ok(stream) => serve_connection(stream, app, stop).await,
                                        Err(e) => {
                                            debug!(remote = %remote_addr, error = %e, "TLS handshake failed");
                                            Ok(())
                                        }
                                    },
                                    None => serve_connection(stream, app, stop).await,
                                };
                                if let Err(e) = result {
                                    debug!(remote = %remote_addr, error = %e, "Connection error");
                                }
                                drop(token);
                            });
                        }
                        Err(e) if is_transient(&e) => {
                            warn!(error = %e, "Transient accept failure");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                        Err(e) => return Err(ServeError::Accept(e)),
                    }
                }

                _ = stop.recv() => {
                    info!(addr = %local_addr, "Stop requested, no longer accepting HTTP connections");
                    break;
                }
            }
        }

        drop(listener);

        info!(
            active = tracker.active_connections(),
            timeout_ms = u64::try_from(drain_timeout.as_millis()).unwrap_or(u64::MAX),
            "Waiting for HTTP connections to close"
        );

        tokio::select! {
            _ = tracker.wait_for_shutdown() => {
                info!("All HTTP connections closed");
            }
            _ = tokio::time::sleep(drain_timeout) => {
                warn!(
                    active = tracker.active_connections(),
                    "Drain timeout reached, connections still active"
                );
            }
        }

        info!(addr = %local_addr, "HTTP listener stopped");
        Ok(())
    }
}

fn configure_stream(stream: &TcpStream, keep_alive: Option<Duration>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }
    if let Some(idle) = keep_alive {
        let keepalive = TcpKeepalive::new().with_time(idle);
        if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
            debug!(error = %e, "Failed to set TCP keep-alive");
        }
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || matches!(error.raw_os_error(), Some(23 | 24)) // ENFILE, EMFILE
}

async fn serve_connection<S>(stream: S, app: Arc<HttpApp>, stop: ShutdownSignal) -> Result<(), hyper::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request: Request<Incoming>| {
        let app = Arc::clone(&app);
        async move { Ok::<_, Infallible>(handle_request(&app, request).await) }
    });

    let conn = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        _ = stop.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

async fn handle_request(app: &HttpApp, request: Request<Incoming>) -> HttpResponse {
    let (parts, body) = request.into_parts();
    match body.collect().await {
        Ok(collected) => app.handle(Request::from_parts(parts, collected.to_bytes())).await,
        Err(e) => {
            warn!(error = %e, "Failed to collect request body");
            error_response(
                StatusCode::BAD_REQUEST,
                "BODY_READ_ERROR",
                &format!("Failed to read request body: {e}"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FnAdapter;
    use crate::compile::{compile, CompileOptions};
    use crate::health::add_health_route;
    use crate::router::RouteTable;
    use crate::socket::{SocketEndpoint, SocketUpgrader};
    use futures_util::{SinkExt, StreamExt};
    use janus_config::SocketConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_tungstenite::tungstenite::Message;

    fn app() -> Arc<HttpApp> {
        let mut table = RouteTable::new();
        add_health_route(&mut table);

        let echo = FnAdapter::new().stream(|_ctx, mut conn| async move {
            while let Some(message) = conn.recv().await {
                if conn.send(message).await.is_err() {
                    break;
                }
            }
        });
        let upgrader = Arc::new(SocketUpgrader::new(&SocketConfig::default()));
        table.get("/chat", Vec::new(), Arc::new(SocketEndpoint::new("Chat", Arc::new(echo), upgrader)));

        Arc::new(compile(table, &CompileOptions::default(), None).unwrap())
    }

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_health_and_stops() {
        let listener = HttpListener::bind("127.0.0.1:0", Some(Duration::from_secs(30)), None)
            .await
            .unwrap();
        let addr = listener.local_addr();
        assert!(!listener.is_tls());

        let stop = ShutdownSignal::new();
        let handle = tokio::spawn(listener.serve(app(), stop.clone(), Duration::from_secs(1)));

        let response = raw_get(addr, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("OK"));

        let response = raw_get(addr, "/missing").await;
        assert!(response.starts_with("HTTP/1.1 404"), "{response}");

        stop.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("listener should stop")
            .unwrap()
            .unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = HttpListener::bind("127.0.0.1:0", None, None).await.unwrap();
        let addr = first.local_addr().to_string();

        let err = HttpListener::bind(&addr, None, None).await.unwrap_err();
        assert!(matches!(err, ServeError::Bind { .. }));
        assert!(err.to_string().contains(&addr));
    }

    #[tokio::test]
    async fn test_socket_route_echoes() {
        let listener = HttpListener::bind("127.0.0.1:0", None, None).await.unwrap();
        let addr = listener.local_addr();
        let stop = ShutdownSignal::new();
        let handle = tokio::spawn(listener.serve(app(), stop.clone(), Duration::from_secs(1)));

        let (mut ws, response) = tokio_tungstenite::connect_async(format!("ws://{addr}/chat"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);

        ws.send(Message::text("ping")).await.unwrap();
        let reply = ws.next().await.unwrap().unwrap();
        assert_eq!(reply.to_text().unwrap(), "ping");
        ws.close(None).await.unwrap();

        stop.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("listener should stop")
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_is_transient() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(is_transient(&io::Error::from_raw_os_error(24)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
