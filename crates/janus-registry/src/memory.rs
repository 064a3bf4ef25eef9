//! In-process registry.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::{BoxFuture, Registry, RegistrationRecord, RegistryError};

/// One call observed by a [`MemoryRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A record was stored.
    Registered(String),
    /// A register call was refused.
    RegisterFailed(String),
    /// A record was removed.
    Deregistered(String),
    /// A deregister call was refused.
    DeregisterFailed(String),
}

/// A registry that keeps records in memory and logs every call in order.
///
/// Failures can be switched on to exercise the non-fatal registration paths.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: RwLock<BTreeMap<String, RegistrationRecord>>,
    events: Mutex<Vec<RegistryEvent>>,
    fail_register: AtomicBool,
    fail_deregister: AtomicBool,
}

impl MemoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent register calls fail.
    pub fn fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent deregister calls fail.
    pub fn fail_deregister(&self, fail: bool) {
        self.fail_deregister.store(fail, Ordering::SeqCst);
    }

    /// Returns the currently registered records, ordered by id.
    pub fn records(&self) -> Vec<RegistrationRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Returns the record with `id`, if registered.
    pub fn get(&self, id: &str) -> Option<RegistrationRecord> {
        self.records.read().get(id).cloned()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns every call observed so far, in order.
    pub fn events(&self) -> Vec<RegistryEvent> {
        self.events.lock().clone()
    }
}

impl Registry for MemoryRegistry {
    fn register<'a>(
        &'a self,
        record: &'a RegistrationRecord,
    ) -> BoxFuture<'a, Result<(), RegistryError>> {
        Box::pin(async move {
            if self.fail_register.load(Ordering::SeqCst) {
                self.events
                    .lock()
                    .push(RegistryEvent::RegisterFailed(record.id.clone()));
                return Err(RegistryError::rejected(&record.id, "registration disabled"));
            }

            self.records.write().insert(record.id.clone(), record.clone());
            self.events
                .lock()
                .push(RegistryEvent::Registered(record.id.clone()));
            Ok(())
        })
    }

    fn deregister<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), RegistryError>> {
        Box::pin(async move {
            if self.fail_deregister.load(Ordering::SeqCst) {
                self.events
                    .lock()
                    .push(RegistryEvent::DeregisterFailed(id.to_string()));
                return Err(RegistryError::rejected(id, "deregistration disabled"));
            }

            self.records.write().remove(id);
            self.events
                .lock()
                .push(RegistryEvent::Deregistered(id.to_string()));
            Ok(())
        })
    }
}
