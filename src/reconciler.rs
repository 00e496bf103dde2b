//! # Reconciler API
//!
//! The traits user code implements and the decisions it hands back.
//!
//! ## Overview
//!
//! - [`Reconciler`] drives a live resource towards its desired state and returns
//!   an [`UpdateControl`] saying which writes to apply.
//! - [`Cleaner`] releases external state of a resource being deleted and returns a
//!   [`DeleteControl`] saying whether the managed finalizer may be removed.
//!   Registering a cleaner is what turns finalizer management on.
//! - [`ErrorStatusHandler`] gets a chance to record a failure in the resource
//!   status on the last retry attempt, and returns an [`ErrorStatusUpdateControl`].
//!
//! All three receive a [`Context`] carrying the resource identity and retry
//! metadata of the current execution.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{ReconcilerError, Result};
use crate::resource::{ResourceId, ResourceSnapshot};
use crate::retry::RetryInfo;

/// Per-execution context handed to user code
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub resource_id: ResourceId,
    pub controller_name: String,
    /// `None` outside of a failure chain
    pub retry_info: Option<RetryInfo>,
    /// The retry policy allows no retries at all, so the first attempt is the last
    pub retry_has_zero_attempts: bool,
}

impl Context {
    pub fn new(
        resource_id: ResourceId,
        controller_name: impl Into<String>,
        retry_info: Option<RetryInfo>,
    ) -> Self {
        Self {
            resource_id,
            controller_name: controller_name.into(),
            retry_info,
            retry_has_zero_attempts: false,
        }
    }

    pub fn with_retry_has_zero_attempts(mut self, zero_attempts: bool) -> Self {
        self.retry_has_zero_attempts = zero_attempts;
        self
    }

    /// Whether this execution is a retry of a failed one
    pub fn is_retry(&self) -> bool {
        self.retry_info.is_some_and(|info| info.attempt > 0)
    }

    /// Whether no further retry follows if this execution fails
    pub fn is_last_attempt(&self) -> bool {
        match self.retry_info {
            Some(info) => info.last_attempt,
            None => self.retry_has_zero_attempts,
        }
    }
}

/// Writes requested by a reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    NoUpdate,
    UpdateResource(ResourceSnapshot),
    UpdateStatus(ResourceSnapshot),
    /// Body first, then status against the version returned by the body write
    UpdateResourceAndStatus(ResourceSnapshot),
}

/// Outcome of [`Reconciler::reconcile`]
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateControl {
    pub action: UpdateAction,
    pub reschedule_after: Option<Duration>,
}

impl UpdateControl {
    pub fn no_update() -> Self {
        Self::from_action(UpdateAction::NoUpdate)
    }

    pub fn update_resource(resource: ResourceSnapshot) -> Self {
        Self::from_action(UpdateAction::UpdateResource(resource))
    }

    pub fn update_status(resource: ResourceSnapshot) -> Self {
        Self::from_action(UpdateAction::UpdateStatus(resource))
    }

    pub fn update_resource_and_status(resource: ResourceSnapshot) -> Self {
        Self::from_action(UpdateAction::UpdateResourceAndStatus(resource))
    }

    /// Ask for another reconciliation after `delay` if nothing else triggers one
    pub fn reschedule_after(mut self, delay: Duration) -> Self {
        self.reschedule_after = Some(delay);
        self
    }

    pub fn is_no_update(&self) -> bool {
        matches!(self.action, UpdateAction::NoUpdate)
    }

    fn from_action(action: UpdateAction) -> Self {
        Self {
            action,
            reschedule_after: None,
        }
    }
}

/// Outcome of [`Cleaner::cleanup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteControl {
    pub remove_finalizer: bool,
    pub reschedule_after: Option<Duration>,
}

impl DeleteControl {
    /// Cleanup is complete; remove the finalizer so deletion can proceed
    pub fn default_delete() -> Self {
        Self {
            remove_finalizer: true,
            reschedule_after: None,
        }
    }

    /// Keep the finalizer, typically while waiting for external cleanup
    pub fn no_finalizer_removal() -> Self {
        Self {
            remove_finalizer: false,
            reschedule_after: None,
        }
    }

    pub fn reschedule_after(mut self, delay: Duration) -> Self {
        self.reschedule_after = Some(delay);
        self
    }
}

impl Default for DeleteControl {
    fn default() -> Self {
        Self::default_delete()
    }
}

/// Outcome of [`ErrorStatusHandler::update_error_status`]
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorStatusUpdateControl {
    /// Resource carrying the status to write, `None` to skip the write
    pub resource: Option<ResourceSnapshot>,
    /// Treat the failure as handled: no retry, no failure metrics
    pub no_retry: bool,
    /// Only applies together with `no_retry`
    pub reschedule_after: Option<Duration>,
}

impl ErrorStatusUpdateControl {
    pub fn update_status(resource: ResourceSnapshot) -> Self {
        Self {
            resource: Some(resource),
            no_retry: false,
            reschedule_after: None,
        }
    }

    /// Leave the status alone and keep the default failure handling
    pub fn no_status_update() -> Self {
        Self {
            resource: None,
            no_retry: false,
            reschedule_after: None,
        }
    }

    pub fn with_no_retry(mut self) -> Self {
        self.no_retry = true;
        self
    }

    pub fn reschedule_after(mut self, delay: Duration) -> Self {
        self.reschedule_after = Some(delay);
        self
    }
}

/// Business logic for live resources
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Bring external state in line with `resource`
    ///
    /// Returning an error fails the execution and hands it to the retry policy.
    async fn reconcile(&self, resource: ResourceSnapshot, context: &Context)
        -> Result<UpdateControl>;
}

/// Business logic for resources marked for deletion
#[async_trait]
pub trait Cleaner: Send + Sync {
    async fn cleanup(&self, resource: ResourceSnapshot, context: &Context) -> Result<DeleteControl>;
}

/// Records a terminal failure in the resource status
pub trait ErrorStatusHandler: Send + Sync {
    /// Decide the status to write and whether the failure still counts as one
    ///
    /// `resource` is a copy of the snapshot the failed execution started from, so
    /// changes the reconciler made before failing do not leak into the status.
    fn update_error_status(
        &self,
        resource: ResourceSnapshot,
        context: &Context,
        error: &ReconcilerError,
    ) -> ErrorStatusUpdateControl;
}
