//! Registration ledger used at teardown.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::{Registry, RegistrationRecord};

/// Registers records and remembers their ids for teardown.
///
/// Registration failures are logged and never returned: the listener keeps
/// serving without discovery visibility. Ids are remembered whether or not
/// the registry accepted them, so teardown always attempts removal.
pub struct Registrations {
    registry: Arc<dyn Registry>,
    ids: Vec<String>,
}

impl fmt::Debug for Registrations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrations")
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

impl Registrations {
    /// Creates an empty ledger over `registry`.
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            ids: Vec::new(),
        }
    }

    /// Registers every record in order.
    pub async fn register_all(&mut self, records: Vec<RegistrationRecord>) {
        for record in records {
            match self.registry.register(&record).await {
                Ok(()) => info!(
                    id = %record.id,
                    name = %record.name,
                    kind = %record.kind,
                    "Registered with service registry"
                ),
                Err(e) => warn!(
                    id = %record.id,
                    error = %e,
                    "Service registration failed, continuing without discovery"
                ),
            }
            self.ids.push(record.id);
        }
    }

    /// Ids registered so far, in registration order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Deregisters every remembered id, best effort.
    ///
    /// Returns the number of failed attempts. The ledger is empty afterwards.
    pub async fn deregister_all(&mut self) -> usize {
        let mut failures = 0;
        for id in self.ids.drain(..) {
            match self.registry.deregister(&id).await {
                Ok(()) => info!(id = %id, "Deregistered from service registry"),
                Err(e) => {
                    failures += 1;
                    warn!(id = %id, error = %e, "Service deregistration failed");
                }
            }
        }
        failures
    }
}
