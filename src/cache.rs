//! # Resource Cache
//!
//! Read-only access to the latest locally-known snapshot of each resource.
//!
//! The cache is owned and populated by the watch layer; the scheduler only reads
//! it, both to build execution scopes and to decide whether it already reflects a
//! write made by the previous execution.

use dashmap::DashMap;

use crate::resource::{ResourceId, ResourceSnapshot};

/// Latest-snapshot accessor maintained by the watch layer
pub trait ResourceCache: Send + Sync {
    fn get(&self, id: &ResourceId) -> Option<ResourceSnapshot>;
}

/// Concurrent map-backed cache for watch layers that keep snapshots in process
#[derive(Debug, Default)]
pub struct InMemoryResourceCache {
    resources: DashMap<ResourceId, ResourceSnapshot>,
}

impl InMemoryResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a snapshot, returning the previous one
    pub fn upsert(&self, snapshot: ResourceSnapshot) -> Option<ResourceSnapshot> {
        self.resources.insert(snapshot.id.clone(), snapshot)
    }

    pub fn remove(&self, id: &ResourceId) -> Option<ResourceSnapshot> {
        self.resources.remove(id).map(|(_, snapshot)| snapshot)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn ids(&self) -> Vec<ResourceId> {
        self.resources.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl ResourceCache for InMemoryResourceCache {
    fn get(&self, id: &ResourceId) -> Option<ResourceSnapshot> {
        self.resources.get(id).map(|entry| entry.value().clone())
    }
}
