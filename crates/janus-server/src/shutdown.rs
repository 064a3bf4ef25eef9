//! Graceful shutdown and restart signalling.
//!
//! A [`ShutdownSignal`] is triggered once, with a [`ShutdownReason`]. Every
//! clone observes the trigger; [`ShutdownSignal::recv`] resolves to the
//! reason.
//!
//! # Example
//!
//! ```rust
//! use janus_server::{ShutdownReason, ShutdownSignal};
//!
//! let shutdown = ShutdownSignal::new();
//! let observer = shutdown.clone();
//!
//! shutdown.trigger_restart();
//! assert_eq!(observer.reason(), Some(ShutdownReason::Restart));
//! ```

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Notify};

const NOT_TRIGGERED: u8 = 0;
const SHUTDOWN: u8 = 1;
const RESTART: u8 = 2;

/// Why the process is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Stop and exit.
    Shutdown,
    /// Stop, then start a fresh process with the same arguments.
    Restart,
}

impl ShutdownReason {
    const fn encode(self) -> u8 {
        match self {
            Self::Shutdown => SHUTDOWN,
            Self::Restart => RESTART,
        }
    }

    const fn decode(value: u8) -> Option<Self> {
        match value {
            SHUTDOWN => Some(Self::Shutdown),
            RESTART => Some(Self::Restart),
            _ => None,
        }
    }
}

/// A signal that can be used to trigger and await graceful shutdown.
///
/// Only the first trigger counts; later ones, whatever their reason, are
/// ignored.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<AtomicU8>,
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Creates a new, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            state: Arc::new(AtomicU8::new(NOT_TRIGGERED)),
            sender,
        }
    }

    /// Requests shutdown.
    pub fn trigger(&self) {
        self.trigger_with(ShutdownReason::Shutdown);
    }

    /// Requests a restart.
    pub fn trigger_restart(&self) {
        self.trigger_with(ShutdownReason::Restart);
    }

    /// Triggers the signal with `reason`. Idempotent.
    pub fn trigger_with(&self, reason: ShutdownReason) {
        if self
            .state
            .compare_exchange(NOT_TRIGGERED, reason.encode(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self.sender.send(());
        }
    }

    /// Returns `true` if the signal has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.reason().is_some()
    }

    /// Returns the trigger reason, if triggered.
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        ShutdownReason::decode(self.state.load(Ordering::SeqCst))
    }

    /// Waits until the signal is triggered and returns the reason.
    ///
    /// Completes immediately if the signal was already triggered.
    pub async fn recv(&self) -> ShutdownReason {
        // Subscribe before checking the state so a concurrent trigger is not missed.
        let mut receiver = self.sender.subscribe();
        if let Some(reason) = self.reason() {
            return reason;
        }
        let _ = receiver.recv().await;
        self.reason().unwrap_or(ShutdownReason::Shutdown)
    }

    /// Creates a signal driven by OS signals.
    ///
    /// On Unix, `SIGTERM` and `SIGINT` request shutdown while `SIGHUP` and
    /// `SIGUSR2` request a restart. Elsewhere only Ctrl+C is observed.
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let signal_clone = signal.clone();

        tokio::spawn(async move {
            if let Some(reason) = wait_for_os_signal().await {
                signal_clone.trigger_with(reason);
            }
        });

        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for an OS signal. Returns `None` if no handler could be installed.
#[cfg(unix)]
async fn wait_for_os_signal() -> Option<ShutdownReason> {
    use tokio::signal::unix::{signal, SignalKind};

    let installed = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
        signal(SignalKind::hangup()),
        signal(SignalKind::user_defined2()),
    );
    let (mut sigterm, mut sigint, mut sighup, mut sigusr2) = match installed {
        (Ok(term), Ok(int), Ok(hup), Ok(usr2)) => (term, int, hup, usr2),
        _ => {
            tracing::error!("Failed to register OS signal handlers");
            return None;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
            Some(ShutdownReason::Shutdown)
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
            Some(ShutdownReason::Shutdown)
        }
        _ = sighup.recv() => {
            tracing::info!("Received SIGHUP, initiating graceful restart");
            Some(ShutdownReason::Restart)
        }
        _ = sigusr2.recv() => {
            tracing::info!("Received SIGUSR2, initiating graceful restart");
            Some(ShutdownReason::Restart)
        }
    }
}

/// Waits for Ctrl+C. Returns `None` if the handler could not be installed.
#[cfg(not(unix))]
async fn wait_for_os_signal() -> Option<ShutdownReason> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            Some(ShutdownReason::Shutdown)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to wait for Ctrl+C");
            None
        }
    }
}

/// Tracks active connections during shutdown.
///
/// When all `ConnectionToken` instances are dropped, the shutdown
/// process knows that all connections have been closed.
///
/// # Example
///
/// ```rust
/// use janus_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
///
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl ConnectionTracker {
    /// Creates a new connection tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires a token to be held for the duration of a connection.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            active: Arc::clone(&self.active),
            notify: Arc::clone(&self.notify),
        }
    }

    /// Returns the number of active connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until all connections are closed.
    pub async fn wait_for_shutdown(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A token representing an active connection.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}
