//! Metadata cache: lazily filled, invalidated by collaborators on structural change.

use crate::catalog::EntityMetadata;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Cache of resolved entity metadata. Entries are immutable within an epoch; every
/// invalidation advances the epoch.
pub trait MetadataCache: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<EntityMetadata>>;
    /// Store `meta` computed during `epoch`. Returns false (and stores nothing) when the
    /// epoch has moved on since, so a resolution racing an invalidation is never cached.
    fn put(&self, name: &str, meta: Arc<EntityMetadata>, epoch: u64) -> bool;
    /// Drop `name` and every cached composite that lists it as a member unit.
    fn invalidate(&self, name: &str);
    fn invalidate_all(&self);
    fn epoch(&self) -> u64;
}

#[derive(Default)]
pub struct InMemoryMetadataCache {
    entries: RwLock<HashMap<String, Arc<EntityMetadata>>>,
    epoch: AtomicU64,
}

impl InMemoryMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataCache for InMemoryMetadataCache {
    fn get(&self, name: &str) -> Option<Arc<EntityMetadata>> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries.get(name).cloned()
    }

    fn put(&self, name: &str, meta: Arc<EntityMetadata>, epoch: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        // checked under the write lock: invalidation bumps the epoch while holding it
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(entity = %name, epoch, "discarding metadata resolved in an old epoch");
            return false;
        }
        entries.insert(name.to_string(), meta);
        true
    }

    fn invalidate(&self, name: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        entries.retain(|key, meta| key != name && !meta.member_units.iter().any(|m| m == name));
        tracing::info!(entity = %name, epoch, "metadata invalidated");
    }

    fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        entries.clear();
        tracing::info!(epoch, "metadata cache cleared");
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}
