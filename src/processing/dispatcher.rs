//! # Reconciliation Dispatcher
//!
//! Runs one execution for one snapshot: the finalizer-gated create/update/delete
//! protocol around the user's [`Reconciler`] and [`Cleaner`].
//!
//! ## Protocol
//!
//! **Deletion requested**
//! - finalizers in use but ours is already gone: nothing to do
//! - otherwise run cleanup; when it allows removal and our finalizer is present,
//!   remove it with a version-locked write
//!
//! **Live resource**
//! - finalizers in use but ours is missing: add it and stop. The write produces
//!   the notification that triggers the actual reconciliation
//! - otherwise reconcile and apply the requested writes, body before status
//!
//! Errors from user code or from the store become [`PostExecutionControl::Failed`],
//! unless the error status handler marks the failure as handled with `no_retry`.
//! Finalizers are in use when the configuration enables them and a cleaner is
//! registered; both are fixed at construction.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::ReconcilerConfig;
use crate::error::{ReconcilerError, Result};
use crate::logging::log_reconcile_operation;
use crate::reconciler::{Cleaner, Context, ErrorStatusHandler, Reconciler, UpdateAction};
use crate::resource::ResourceSnapshot;
use crate::retry::RetryPolicy;
use crate::store::RemoteStore;

use super::execution_scope::ExecutionScope;
use super::post_execution::PostExecutionControl;

pub struct ReconciliationDispatcher {
    controller_name: String,
    finalizer: String,
    finalizer_enabled: bool,
    retry_has_zero_attempts: bool,
    reconciler: Arc<dyn Reconciler>,
    cleaner: Option<Arc<dyn Cleaner>>,
    error_status_handler: Option<Arc<dyn ErrorStatusHandler>>,
    store: Arc<dyn RemoteStore>,
}

impl std::fmt::Debug for ReconciliationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationDispatcher")
            .field("controller_name", &self.controller_name)
            .field("finalizer", &self.finalizer)
            .field("uses_finalizer", &self.uses_finalizer())
            .field("has_cleaner", &self.cleaner.is_some())
            .field("has_error_status_handler", &self.error_status_handler.is_some())
            .finish()
    }
}

impl ReconciliationDispatcher {
    pub fn new(
        config: &ReconcilerConfig,
        reconciler: Arc<dyn Reconciler>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            controller_name: config.controller_name.clone(),
            finalizer: config.finalizer(),
            finalizer_enabled: config.use_finalizer,
            retry_has_zero_attempts: false,
            reconciler,
            cleaner: None,
            error_status_handler: None,
            store,
        }
    }

    pub fn with_cleaner(mut self, cleaner: Arc<dyn Cleaner>) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    pub fn with_error_status_handler(mut self, handler: Arc<dyn ErrorStatusHandler>) -> Self {
        self.error_status_handler = Some(handler);
        self
    }

    /// Lets the first attempt count as the last one when the policy never retries
    pub fn with_retry_policy(mut self, policy: &RetryPolicy) -> Self {
        self.retry_has_zero_attempts = policy.has_zero_attempts();
        self
    }

    pub fn uses_finalizer(&self) -> bool {
        self.finalizer_enabled && self.cleaner.is_some()
    }

    pub fn finalizer(&self) -> &str {
        &self.finalizer
    }

    pub async fn handle_execution(&self, scope: &ExecutionScope) -> PostExecutionControl {
        let resource = scope.resource.clone();
        let context = Context::new(
            resource.id.clone(),
            self.controller_name.clone(),
            scope.retry_info,
        )
        .with_retry_has_zero_attempts(self.retry_has_zero_attempts);

        debug!(
            execution_id = %scope.execution_id,
            resource_id = %resource.id,
            version = %resource.version,
            deletion_requested = resource.deletion_requested,
            "Handling execution"
        );

        let result = if resource.deletion_requested {
            self.handle_cleanup(resource, &context).await
        } else {
            self.handle_reconcile(resource, &context).await
        };
        result.unwrap_or_else(PostExecutionControl::failed)
    }

    async fn handle_reconcile(
        &self,
        resource: ResourceSnapshot,
        context: &Context,
    ) -> Result<PostExecutionControl> {
        if self.uses_finalizer() && !resource.has_finalizer(&self.finalizer) {
            let updated = self.add_finalizer(&resource).await?;
            log_reconcile_operation(
                "reconcile",
                &resource.id,
                Some(updated.version.as_str()),
                "finalizer_added",
                Some(self.finalizer.as_str()),
            );
            return Ok(PostExecutionControl::finalizer_added(updated));
        }

        // Only keep a pristine copy when the error status handler may need it
        let original = self.wants_error_status(context).then(|| resource.clone());

        match self.reconcile_execution(resource, context).await {
            Ok(control) => Ok(control),
            Err(error) => match original {
                Some(original) => self.handle_error_status(original, context, error).await,
                None => Err(error),
            },
        }
    }

    async fn reconcile_execution(
        &self,
        resource: ResourceSnapshot,
        context: &Context,
    ) -> Result<PostExecutionControl> {
        let expected_version = resource.version.clone();
        let control = self.reconciler.reconcile(resource, context).await?;

        let updated = match control.action {
            UpdateAction::NoUpdate => None,
            UpdateAction::UpdateResource(desired) => {
                Some(self.store.update(&desired, &expected_version).await?)
            }
            UpdateAction::UpdateStatus(desired) => Some(self.store.update_status(&desired).await?),
            UpdateAction::UpdateResourceAndStatus(mut desired) => {
                let body = self.store.update(&desired, &expected_version).await?;
                desired.version = body.version;
                Some(self.store.update_status(&desired).await?)
            }
        };

        Ok(match updated {
            Some(resource) => {
                debug!(
                    resource_id = %resource.id,
                    version = %resource.version,
                    "Resource updated by reconciliation"
                );
                PostExecutionControl::resource_updated(resource, control.reschedule_after)
            }
            None => PostExecutionControl::default_dispatch(control.reschedule_after),
        })
    }

    async fn handle_cleanup(
        &self,
        resource: ResourceSnapshot,
        context: &Context,
    ) -> Result<PostExecutionControl> {
        let Some(cleaner) = &self.cleaner else {
            debug!(resource_id = %resource.id, "No cleaner registered, skipping deletion handling");
            return Ok(PostExecutionControl::default_dispatch(None));
        };

        let finalizer_present = resource.has_finalizer(&self.finalizer);
        if self.uses_finalizer() && !finalizer_present {
            debug!(resource_id = %resource.id, "Finalizer already removed, skipping cleanup");
            return Ok(PostExecutionControl::default_dispatch(None));
        }

        let control = cleaner.cleanup(resource.clone(), context).await?;

        if control.remove_finalizer && self.uses_finalizer() && finalizer_present {
            let updated = self.remove_finalizer(&resource).await?;
            log_reconcile_operation(
                "cleanup",
                &resource.id,
                Some(updated.version.as_str()),
                "finalizer_removed",
                None,
            );
            return Ok(PostExecutionControl::finalizer_removed(updated));
        }

        debug!(
            resource_id = %resource.id,
            remove_finalizer = control.remove_finalizer,
            "Cleanup finished without finalizer removal"
        );
        Ok(PostExecutionControl::default_dispatch(control.reschedule_after))
    }

    async fn add_finalizer(&self, resource: &ResourceSnapshot) -> Result<ResourceSnapshot> {
        debug!(
            resource_id = %resource.id,
            finalizer = %self.finalizer,
            "Adding finalizer"
        );
        let mut desired = resource.clone();
        desired.add_finalizer(self.finalizer.as_str());
        Ok(self.store.update(&desired, &resource.version).await?)
    }

    async fn remove_finalizer(&self, resource: &ResourceSnapshot) -> Result<ResourceSnapshot> {
        let mut desired = resource.clone();
        desired.remove_finalizer(&self.finalizer);
        Ok(self.store.update(&desired, &resource.version).await?)
    }

    fn wants_error_status(&self, context: &Context) -> bool {
        self.error_status_handler.is_some() && context.is_last_attempt()
    }

    async fn handle_error_status(
        &self,
        original: ResourceSnapshot,
        context: &Context,
        error: ReconcilerError,
    ) -> Result<PostExecutionControl> {
        let Some(handler) = &self.error_status_handler else {
            return Err(error);
        };
        let control = handler.update_error_status(original, context, &error);

        let mut updated = None;
        if let Some(desired) = &control.resource {
            match self.store.update_status(desired).await {
                Ok(resource) => updated = Some(resource),
                Err(status_error) => error!(
                    resource_id = %context.resource_id,
                    error = %status_error,
                    reconcile_error = %error,
                    "Error during error status handling"
                ),
            }
        }

        if !control.no_retry {
            return Err(error);
        }
        warn!(
            resource_id = %context.resource_id,
            error = %error,
            "Reconciliation failed, error status handler disabled retry"
        );
        Ok(match updated {
            Some(resource) => PostExecutionControl::resource_updated(resource, control.reschedule_after),
            None => PostExecutionControl::default_dispatch(control.reschedule_after),
        })
    }
}
