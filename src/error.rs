//! # Error Types
//!
//! Error taxonomy for the reconciliation core.
//!
//! - [`StoreError`] covers failures reported by the remote store (optimistic-lock
//!   conflicts, rate limiting, unavailability). These are transient and subject to
//!   the retry policy.
//! - [`ReconcilerError`] is what a dispatcher execution fails with. User code returns
//!   it from `reconcile`/`cleanup`, either through one of the constructors or by
//!   converting an [`anyhow::Error`].
//!
//! No error produced here ever escapes the scheduler; failures are contained per
//! resource and surfaced as a failed execution outcome.

use thiserror::Error;

use crate::resource::{ResourceId, ResourceVersion};

/// Errors reported by a [`RemoteStore`](crate::store::RemoteStore) implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The version-locked write was rejected because the stored version moved on
    #[error("Version conflict for {resource_id}: expected {expected}, found {actual}")]
    VersionConflict {
        resource_id: ResourceId,
        expected: ResourceVersion,
        actual: ResourceVersion,
    },

    /// The resource no longer exists in the store
    #[error("Resource not found: {0}")]
    NotFound(ResourceId),

    /// The store asked the caller to slow down
    #[error("Rate limited by remote store (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    /// Transport or server-side failure
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised during a single reconciliation execution
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Reconciliation failed for {resource_id}: {message}")]
    ReconcileFailed {
        resource_id: ResourceId,
        message: String,
    },

    #[error("Cleanup failed for {resource_id}: {message}")]
    CleanupFailed {
        resource_id: ResourceId,
        message: String,
    },

    #[error("Reconciler panicked: {0}")]
    Panicked(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error(transparent)]
    User(#[from] anyhow::Error),
}

impl ReconcilerError {
    /// Create a reconcile failed error
    pub fn reconcile_failed(resource_id: &ResourceId, message: impl Into<String>) -> Self {
        Self::ReconcileFailed {
            resource_id: resource_id.clone(),
            message: message.into(),
        }
    }

    /// Create a cleanup failed error
    pub fn cleanup_failed(resource_id: &ResourceId, message: impl Into<String>) -> Self {
        Self::CleanupFailed {
            resource_id: resource_id.clone(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether this failure is an optimistic-locking conflict
    ///
    /// Conflicts are expected under concurrent writers and are logged at a lower
    /// level as long as more retry attempts remain.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::VersionConflict { .. }))
    }
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;
