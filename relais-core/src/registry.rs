//! Ownership table for initialized services.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::breaker::CircuitBreaker;
use crate::types::ServiceId;

/// The live set of initialized services.
///
/// Each entry is a breaker wrapping its provider client; manager-level
/// counters live in the [`MetricsCollector`]. The table is exclusively owned
/// by the service manager and never handed out by reference: readers are
/// dispatch lookups, writers are lifecycle operations, and the two exclude
/// each other through the lock.
///
/// [`MetricsCollector`]: crate::metrics::MetricsCollector
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    entries: RwLock<HashMap<ServiceId, Arc<CircuitBreaker>>>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breaker-wrapped provider, replacing any previous entry
    pub fn insert(&self, id: ServiceId, breaker: Arc<CircuitBreaker>) {
        self.write().insert(id, breaker);
    }

    /// Remove and return one entry
    pub fn remove(&self, id: ServiceId) -> Option<Arc<CircuitBreaker>> {
        self.write().remove(&id)
    }

    /// Look up the breaker for a service
    pub fn get(&self, id: ServiceId) -> Option<Arc<CircuitBreaker>> {
        self.read().get(&id).cloned()
    }

    /// Whether a service is currently registered
    pub fn contains(&self, id: ServiceId) -> bool {
        self.read().contains_key(&id)
    }

    /// Ids of every registered service, in unspecified order
    pub fn ids(&self) -> Vec<ServiceId> {
        self.read().keys().copied().collect()
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every entry, returning the previous set for disposal
    pub fn drain(&self) -> Vec<(ServiceId, Arc<CircuitBreaker>)> {
        self.write().drain().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ServiceId, Arc<CircuitBreaker>>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ServiceId, Arc<CircuitBreaker>>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
