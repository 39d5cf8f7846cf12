//! # Service Registry: Process-Wide Handle Lookup
//!
//! The registry hands out handles to remote services by identity and keeps a
//! process-wide cache of the handles it has already resolved. The cache is
//! one of the places a hook has to rewrite.

use crate::{RemoteHandle, ServiceIdentity};
use dashmap::DashMap;
use std::sync::Arc;

/// Mutable identity → handle cache shared by everything that clones it.
///
/// Every write replaces a single entry atomically, so a concurrent reader sees
/// either the previous handle or the new one.
#[derive(Debug, Clone, Default)]
pub struct ServiceCache {
    entries: Arc<DashMap<String, RemoteHandle>>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached handle for `identity`, if any.
    pub fn get(&self, identity: &ServiceIdentity) -> Option<RemoteHandle> {
        self.entries
            .get(identity.as_str())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Replaces the entry for `identity`, returning the previous handle.
    pub fn put(&self, identity: &ServiceIdentity, handle: RemoteHandle) -> Option<RemoteHandle> {
        self.entries.insert(identity.as_str().to_owned(), handle)
    }
}

/// Lookup service returning handles to remote services.
pub trait ServiceRegistry {
    /// Current handle for `identity`, or `None` if the registry has none.
    fn get_handle(&self, identity: &ServiceIdentity) -> Option<RemoteHandle>;

    /// The registry's own handle cache.
    fn cache(&self) -> Option<ServiceCache>;
}
