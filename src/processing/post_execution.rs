//! Outcome of one dispatcher execution, consumed once by the scheduler.

use std::time::Duration;

use crate::error::ReconcilerError;
use crate::resource::ResourceSnapshot;

#[derive(Debug)]
pub enum PostExecutionControl {
    /// Nothing was written
    DefaultDispatch { reschedule_after: Option<Duration> },
    /// Only the managed finalizer was added; reconcile was not invoked
    FinalizerAdded { resource: ResourceSnapshot },
    ResourceUpdated {
        resource: ResourceSnapshot,
        reschedule_after: Option<Duration>,
        finalizer_removed: bool,
    },
    Failed { error: ReconcilerError },
}

impl PostExecutionControl {
    pub fn default_dispatch(reschedule_after: Option<Duration>) -> Self {
        Self::DefaultDispatch { reschedule_after }
    }

    pub fn finalizer_added(resource: ResourceSnapshot) -> Self {
        Self::FinalizerAdded { resource }
    }

    pub fn resource_updated(resource: ResourceSnapshot, reschedule_after: Option<Duration>) -> Self {
        Self::ResourceUpdated {
            resource,
            reschedule_after,
            finalizer_removed: false,
        }
    }

    pub fn finalizer_removed(resource: ResourceSnapshot) -> Self {
        Self::ResourceUpdated {
            resource,
            reschedule_after: None,
            finalizer_removed: true,
        }
    }

    pub fn failed(error: ReconcilerError) -> Self {
        Self::Failed { error }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn error(&self) -> Option<&ReconcilerError> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Snapshot returned by the store when this execution wrote the resource
    pub fn updated_resource(&self) -> Option<&ResourceSnapshot> {
        match self {
            Self::FinalizerAdded { resource } | Self::ResourceUpdated { resource, .. } => {
                Some(resource)
            }
            _ => None,
        }
    }

    pub fn reschedule_after(&self) -> Option<Duration> {
        match self {
            Self::DefaultDispatch { reschedule_after }
            | Self::ResourceUpdated {
                reschedule_after, ..
            } => *reschedule_after,
            Self::FinalizerAdded { .. } | Self::Failed { .. } => None,
        }
    }

    pub fn is_finalizer_removed(&self) -> bool {
        matches!(
            self,
            Self::ResourceUpdated {
                finalizer_removed: true,
                ..
            }
        )
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DefaultDispatch { .. } => "default_dispatch",
            Self::FinalizerAdded { .. } => "finalizer_added",
            Self::ResourceUpdated {
                finalizer_removed: true,
                ..
            } => "finalizer_removed",
            Self::ResourceUpdated { .. } => "resource_updated",
            Self::Failed { .. } => "failed",
        }
    }
}
