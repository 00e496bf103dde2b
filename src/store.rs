//! # Remote Store
//!
//! Write contract for the store holding the authoritative resource state.
//!
//! The dispatcher is the only caller. Body writes are version-locked: the store
//! must reject the write with [`StoreError::VersionConflict`] when the stored
//! version differs from the expected one. Status writes carry the version on the
//! snapshot itself.
//!
//! [`InMemoryRemoteStore`] implements the contract with monotonically increasing
//! numeric versions. It is useful for local runs, demos and tests; it does not
//! emit watch notifications by itself.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::StoreError;
use crate::resource::{ResourceId, ResourceSnapshot, ResourceVersion};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Replace the resource body, failing on version mismatch
    async fn update(
        &self,
        resource: &ResourceSnapshot,
        expected_version: &ResourceVersion,
    ) -> Result<ResourceSnapshot, StoreError>;

    /// Replace the status sub-resource
    async fn update_status(&self, resource: &ResourceSnapshot)
        -> Result<ResourceSnapshot, StoreError>;
}

/// Kind of write recorded by [`InMemoryRemoteStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Update,
    UpdateStatus,
}

/// One accepted write, as seen by the store
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub kind: WriteKind,
    pub resource_id: ResourceId,
    /// Version the writer claimed to be writing against
    pub expected_version: ResourceVersion,
    pub new_version: ResourceVersion,
}

#[derive(Debug, Default)]
struct StoreState {
    resources: HashMap<ResourceId, ResourceSnapshot>,
    next_version: u64,
    writes: Vec<WriteRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<StoreState>,
}

impl InMemoryRemoteStore {
    /// Create a store whose first assigned version is `initial_version + 1`
    pub fn with_initial_version(initial_version: u64) -> Self {
        Self {
            state: Mutex::new(StoreState {
                next_version: initial_version,
                ..Default::default()
            }),
        }
    }

    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resource, assigning it a fresh version
    pub fn create(&self, mut resource: ResourceSnapshot) -> ResourceSnapshot {
        let mut state = self.state.lock();
        resource.version = Self::bump(&mut state);
        state
            .resources
            .insert(resource.id.clone(), resource.clone());
        resource
    }

    /// Request deletion
    ///
    /// A resource without finalizers is removed immediately and `None` is
    /// returned; otherwise it is kept, flagged for deletion, and the updated
    /// snapshot is returned.
    pub fn request_deletion(&self, id: &ResourceId) -> Option<ResourceSnapshot> {
        let mut state = self.state.lock();
        let current = state.resources.get(id)?.clone();
        if current.finalizers.is_empty() {
            state.resources.remove(id);
            return None;
        }
        let mut updated = current;
        updated.deletion_requested = true;
        updated.version = Self::bump(&mut state);
        state.resources.insert(id.clone(), updated.clone());
        Some(updated)
    }

    pub fn get(&self, id: &ResourceId) -> Option<ResourceSnapshot> {
        self.state.lock().resources.get(id).cloned()
    }

    /// All accepted writes, oldest first
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    fn bump(state: &mut StoreState) -> ResourceVersion {
        state.next_version += 1;
        ResourceVersion::new(state.next_version.to_string())
    }

    fn current(state: &StoreState, id: &ResourceId) -> Result<ResourceSnapshot, StoreError> {
        state
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Persist a write, physically removing resources that are marked for
    /// deletion and have no finalizers left
    ///
    /// A write leaving the resource unchanged is a no-op: the version stays the
    /// same and nothing is recorded.
    fn commit(
        state: &mut StoreState,
        kind: WriteKind,
        mut resource: ResourceSnapshot,
        expected_version: ResourceVersion,
    ) -> ResourceSnapshot {
        if state.resources.get(&resource.id) == Some(&resource) {
            return resource;
        }
        resource.version = Self::bump(state);
        state.writes.push(WriteRecord {
            kind,
            resource_id: resource.id.clone(),
            expected_version,
            new_version: resource.version.clone(),
        });
        if resource.deletion_requested && resource.finalizers.is_empty() {
            state.resources.remove(&resource.id);
        } else {
            state
                .resources
                .insert(resource.id.clone(), resource.clone());
        }
        resource
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn update(
        &self,
        resource: &ResourceSnapshot,
        expected_version: &ResourceVersion,
    ) -> Result<ResourceSnapshot, StoreError> {
        let mut state = self.state.lock();
        let current = Self::current(&state, &resource.id)?;
        if &current.version != expected_version {
            return Err(StoreError::VersionConflict {
                resource_id: resource.id.clone(),
                expected: expected_version.clone(),
                actual: current.version,
            });
        }

        let mut updated = resource.clone();
        updated.version = current.version;
        // Body writes never touch status or the deletion flag
        updated.status = current.status;
        updated.deletion_requested = current.deletion_requested;
        Ok(Self::commit(
            &mut state,
            WriteKind::Update,
            updated,
            expected_version.clone(),
        ))
    }

    async fn update_status(
        &self,
        resource: &ResourceSnapshot,
    ) -> Result<ResourceSnapshot, StoreError> {
        let mut state = self.state.lock();
        let current = Self::current(&state, &resource.id)?;
        if current.version != resource.version {
            return Err(StoreError::VersionConflict {
                resource_id: resource.id.clone(),
                expected: resource.version.clone(),
                actual: current.version,
            });
        }

        let mut updated = current;
        updated.status = resource.status.clone();
        Ok(Self::commit(
            &mut state,
            WriteKind::UpdateStatus,
            updated,
            resource.version.clone(),
        ))
    }
}
