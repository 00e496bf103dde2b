//! Notification types consumed by the scheduler.
//!
//! Events carry no payload beyond identity and kind: the scheduler always
//! re-reads the latest snapshot from the cache before executing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::resource::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceAction {
    Added,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Change observed by the watch layer
    Resource {
        resource_id: ResourceId,
        action: ResourceAction,
    },
    /// Retry or reschedule timer fired
    Timer { resource_id: ResourceId },
}

impl Event {
    pub fn resource(resource_id: ResourceId, action: ResourceAction) -> Self {
        Self::Resource {
            resource_id,
            action,
        }
    }

    pub fn timer(resource_id: ResourceId) -> Self {
        Self::Timer { resource_id }
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Self::Resource { resource_id, .. } | Self::Timer { resource_id } => resource_id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Self::Resource {
                action: ResourceAction::Deleted,
                ..
            }
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource {
                resource_id,
                action,
            } => write!(f, "{action:?}({resource_id})"),
            Self::Timer { resource_id } => write!(f, "Timer({resource_id})"),
        }
    }
}
