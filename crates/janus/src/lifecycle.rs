//! Resources owned by one serve call and their teardown.
//!
//! # Teardown order
//!
//! 1. Deregister every registry record written during setup
//! 2. Stop the RPC listener and wait for it to drain, at most the drain
//!    timeout
//! 3. Stop the HTTP listener and wait for it to drain (it bounds its own drain)
//! 4. Close the response cache
//!
//! A listener that was bound but never served is simply dropped.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use janus_registry::{RegistrationRecord, Registrations};
use janus_server::{HttpApp, HttpListener, ResponseCache, ShutdownSignal};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::rpc::PendingRpc;

/// An HTTP listener that is bound but not yet serving.
#[derive(Debug)]
pub(crate) struct PendingHttp {
    listener: HttpListener,
    app: Arc<HttpApp>,
    drain_timeout: Duration,
}

impl PendingHttp {
    pub(crate) fn new(listener: HttpListener, app: HttpApp, drain_timeout: Duration) -> Self {
        Self {
            listener,
            app: Arc::new(app),
            drain_timeout,
        }
    }
}

/// One listener's state.
enum Slot<P> {
    Empty,
    Bound(P),
    Serving {
        stop: ShutdownSignal,
        task: JoinHandle<()>,
    },
}

impl<P> Slot<P> {
    /// Spawns the serve loop of a bound listener with its own stop signal.
    /// Does nothing in any other state.
    fn launch<F, Fut, E>(&mut self, protocol: &'static str, serve: F)
    where
        F: FnOnce(P, ShutdownSignal) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let pending = match std::mem::replace(self, Self::Empty) {
            Self::Bound(pending) => pending,
            other => {
                *self = other;
                return;
            }
        };

        let stop = ShutdownSignal::new();
        let serving = serve(pending, stop.clone());
        let task = tokio::spawn(async move {
            if let Err(e) = serving.await {
                serve_failed(protocol, &e);
            }
        });
        *self = Self::Serving { stop, task };
    }

    /// Stops the listener. With a `limit`, a serve loop still draining when
    /// it expires is aborted.
    async fn close(self, protocol: &'static str, limit: Option<Duration>) {
        match self {
            Self::Empty => {}
            Self::Bound(pending) => {
                drop(pending);
                debug!(protocol, "Released listener that never served");
            }
            Self::Serving { stop, mut task } => {
                stop.trigger();
                let joined = match limit {
                    Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                        Ok(joined) => joined,
                        Err(_elapsed) => {
                            task.abort();
                            // Wait for the cancellation so the listener is released.
                            let _ = task.await;
                            warn!(
                                protocol,
                                timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                                "Drain timeout reached, aborting listener"
                            );
                            return;
                        }
                    },
                    None => (&mut task).await,
                };
                if let Err(e) = joined {
                    error!(protocol, error = %e, "Serve task ended abnormally");
                }
                info!(protocol, "Listener closed");
            }
        }
    }
}

/// A listener stopped with an error after it started serving.
///
/// The instance is already advertised, so it must not keep running
/// half-up.
fn serve_failed(protocol: &'static str, error: &dyn fmt::Display) -> ! {
    error!(protocol, error = %error, "Listener failed after start, terminating process");
    janus_telemetry::flush();
    std::process::exit(1);
}

/// Everything a serve call has to release, whichever way it ends.
pub(crate) struct Resources {
    registrations: Option<Registrations>,
    rpc: Slot<PendingRpc>,
    http: Slot<PendingHttp>,
    cache: Option<Arc<dyn ResponseCache>>,
    drain_timeout: Duration,
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resources")
            .field("registrations", &self.registrations)
            .field("rpc", &!matches!(self.rpc, Slot::Empty))
            .field("http", &!matches!(self.http, Slot::Empty))
            .field("cache", &self.cache)
            .field("drain_timeout", &self.drain_timeout)
            .finish()
    }
}

impl Resources {
    pub(crate) fn new(registrations: Option<Registrations>, drain_timeout: Duration) -> Self {
        Self {
            registrations,
            rpc: Slot::Empty,
            http: Slot::Empty,
            cache: None,
            drain_timeout,
        }
    }

    /// Registers `records`; failures are logged by the ledger.
    pub(crate) async fn register(&mut self, records: Vec<RegistrationRecord>) {
        if let Some(registrations) = &mut self.registrations {
            registrations.register_all(records).await;
        }
    }

    pub(crate) fn set_rpc(&mut self, pending: PendingRpc) {
        self.rpc = Slot::Bound(pending);
    }

    pub(crate) fn set_http(&mut self, pending: PendingHttp) {
        self.http = Slot::Bound(pending);
    }

    pub(crate) fn set_cache(&mut self, cache: Option<Arc<dyn ResponseCache>>) {
        self.cache = cache;
    }

    pub(crate) fn cache(&self) -> Option<Arc<dyn ResponseCache>> {
        self.cache.clone()
    }

    /// Starts every bound listener.
    pub(crate) fn start(&mut self) {
        self.rpc.launch("grpc", |pending, stop| {
            info!(addr = %pending.local_addr(), "RPC listener serving");
            pending.serve(stop)
        });
        self.http.launch("http", |pending, stop| {
            pending
                .listener
                .serve(pending.app, stop, pending.drain_timeout)
        });
    }

    /// Releases everything, in order. Runs once per serve call.
    pub(crate) async fn teardown(self) {
        let Self {
            registrations,
            rpc,
            http,
            cache,
            drain_timeout,
        } = self;

        if let Some(mut registrations) = registrations {
            let failures = registrations.deregister_all().await;
            if failures > 0 {
                warn!(failures, "Registry records left behind, relying on registry expiry");
            }
        }

        rpc.close("grpc", Some(drain_timeout)).await;
        http.close("http", None).await;

        if let Some(cache) = cache {
            cache.close();
            debug!("Response cache closed");
        }
    }
}
