//! # Watch Layer Contract
//!
//! Hooks the scheduler calls back into the component producing notifications.
//!
//! Both hooks run while the scheduler holds its bookkeeping lock, so an
//! implementation must not call back into the scheduler synchronously.

use crate::resource::ResourceId;

pub trait WatchLayer: Send + Sync {
    /// Deliver the next notification for `id` even if it would otherwise be
    /// deduplicated (e.g. the echo of a write the controller made itself)
    fn whitelist_next_event(&self, id: &ResourceId);

    /// All scheduler state for `id` has been released after deletion
    fn cleanup_for_resource(&self, _id: &ResourceId) {}
}

/// Watch layer that never suppresses notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWatchLayer;

impl WatchLayer for NoopWatchLayer {
    fn whitelist_next_event(&self, id: &ResourceId) {
        tracing::trace!(resource_id = %id, "Whitelist request ignored by no-op watch layer");
    }
}
