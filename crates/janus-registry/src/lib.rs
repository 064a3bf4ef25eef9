//! Service registry integration for Janus.
//!
//! A named Janus service advertises each listener it binds:
//!
//! - The HTTP listener as two records, `{name}.http` and `{name}`
//! - The RPC listener as one record, `{name}.grpc`
//!
//! Registration goes through the [`Registry`] trait. [`ConsulRegistry`]
//! talks to a Consul agent; [`MemoryRegistry`] keeps records in process and
//! logs every call, which makes it the registry of choice in tests.
//!
//! [`Registrations`] remembers what was registered so teardown can
//! deregister it, best effort.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use janus_registry::{records_for, Endpoint, HealthCheck, MemoryRegistry, Registrations, ServiceKind};
//!
//! let registry = Arc::new(MemoryRegistry::new());
//! let mut ledger = Registrations::new(registry.clone());
//!
//! let endpoint = Endpoint::new("orders", "10.0.0.5", 8080);
//! let check = HealthCheck::http(&endpoint.addr(), false, Duration::from_secs(5), Duration::from_secs(10));
//! ledger.register_all(records_for(ServiceKind::Http, &endpoint, &check)).await;
//!
//! ledger.deregister_all().await;
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod consul;
mod error;
mod ledger;
mod memory;
mod record;

use std::future::Future;
use std::pin::Pin;

pub use consul::ConsulRegistry;
pub use error::RegistryError;
pub use ledger::Registrations;
pub use memory::{MemoryRegistry, RegistryEvent};
pub use record::{
    records_for, Endpoint, HealthCheck, HealthProbe, RecordTemplate, RegistrationRecord,
    ServiceKind,
};

/// A boxed future used by [`Registry`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A service-discovery backend.
///
/// Implementations must be safe to share between tasks.
pub trait Registry: Send + Sync + 'static {
    /// Registers (or re-registers) a record.
    fn register<'a>(
        &'a self,
        record: &'a RegistrationRecord,
    ) -> BoxFuture<'a, Result<(), RegistryError>>;

    /// Removes the record with the given id.
    fn deregister<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), RegistryError>>;
}
