//! # Reconciliation Scheduler
//!
//! Decides when each resource is reconciled.
//!
//! ## Overview
//!
//! Notifications from the watch layer and timer firings mark a resource dirty.
//! A dirty resource that is not already executing is read from the cache and
//! submitted to a bounded worker pool; the dispatcher outcome comes back over a
//! channel to a single loop task, which updates retry state, timers and markers
//! and decides whether to run again.
//!
//! ## Guarantees
//!
//! - **Single-flight**: at most one execution per resource is in flight
//! - **Coalescing**: any number of notifications during an execution produce at
//!   most one follow-up execution, always on the latest cached snapshot
//! - **Retry**: failures are retried on timers according to the [`RetryPolicy`];
//!   a newer notification during the failed execution short-circuits the wait
//! - **Cache freshness**: after our own write the follow-up execution waits until
//!   the cache shows that write (see [`cache_sync`](super::cache_sync))
//!
//! All bookkeeping lives in one mutex-guarded [`SchedulerState`]. Dispatcher
//! executions run outside the lock.
//!
//! ## Stopping
//!
//! [`Scheduler::stop`] makes the scheduler ignore notifications and skip the
//! bookkeeping of executions that complete afterwards. In-flight executions are
//! not cancelled.

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::cache::ResourceCache;
use crate::config::ReconcilerConfig;
use crate::error::{ReconcilerError, Result};
use crate::events::{Event, EventMarker, ResourceAction};
use crate::metrics::{Metrics, NoopMetrics};
use crate::reconciler::{Cleaner, ErrorStatusHandler, Reconciler};
use crate::resource::ResourceId;
use crate::retry::{RetryExecution, RetryInfo, RetryPolicy};
use crate::store::RemoteStore;
use crate::timer::{TimerSource, TokioTimerSource};
use crate::watch::{NoopWatchLayer, WatchLayer};

use super::cache_sync::is_cache_ready_for_instant_reconciliation;
use super::dispatcher::ReconciliationDispatcher;
use super::execution_scope::ExecutionScope;
use super::post_execution::PostExecutionControl;

/// Result of one execution delivered back to the scheduler loop
#[derive(Debug)]
struct ExecutionCompletion {
    scope: ExecutionScope,
    outcome: PostExecutionControl,
}

#[derive(Debug, Default)]
struct SchedulerState {
    running: bool,
    markers: EventMarker,
    under_execution: HashSet<ResourceId>,
    retry_state: HashMap<ResourceId, RetryExecution>,
}

type LoopChannels = (
    mpsc::UnboundedReceiver<Event>,
    mpsc::UnboundedReceiver<ExecutionCompletion>,
);

struct SchedulerInner {
    controller_name: String,
    retry_policy: RetryPolicy,
    max_reconciliation_interval: Option<Duration>,
    dispatcher: Arc<ReconciliationDispatcher>,
    cache: Arc<dyn ResourceCache>,
    timer: Arc<dyn TimerSource>,
    watch: Arc<dyn WatchLayer>,
    metrics: Arc<dyn Metrics>,
    state: Mutex<SchedulerState>,
    permits: Arc<Semaphore>,
    runtime: Handle,
    event_tx: mpsc::UnboundedSender<Event>,
    completion_tx: mpsc::UnboundedSender<ExecutionCompletion>,
    loop_channels: Mutex<Option<LoopChannels>>,
}

/// Event-driven reconciliation scheduler
///
/// Cheap to clone; all clones drive the same state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("controller_name", &self.inner.controller_name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Scheduler {
    pub fn builder(config: ReconcilerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(config)
    }

    /// Start accepting notifications
    ///
    /// Spawns the scheduler loop on first start. Resources already marked dirty
    /// (for example by executions that finished after a stop) are scheduled.
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if state.running {
            return;
        }
        state.running = true;

        if let Some((events, completions)) = self.inner.loop_channels.lock().take() {
            let weak = Arc::downgrade(&self.inner);
            self.inner
                .runtime
                .spawn(run_scheduler_loop(weak, events, completions));
        }

        info!(
            controller = %self.inner.controller_name,
            max_concurrent_reconciliations = self.inner.permits.available_permits(),
            "Scheduler started"
        );

        for id in state.markers.resources_with_event_present() {
            self.inner.try_schedule_execution(&mut state, &id);
        }
    }

    /// Stop accepting notifications; in-flight executions run to completion
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.running {
            state.running = false;
            info!(controller = %self.inner.controller_name, "Scheduler stopped");
        }
    }

    /// Entry point for the watch layer
    pub fn notify(&self, id: &ResourceId, is_delete: bool) {
        let action = if is_delete {
            ResourceAction::Deleted
        } else {
            ResourceAction::Updated
        };
        self.inner.handle_event(Event::resource(id.clone(), action));
    }

    pub fn handle_event(&self, event: Event) {
        self.inner.handle_event(event);
    }

    /// Sender feeding the scheduler loop, for event sources that cannot call
    /// [`Scheduler::notify`] directly
    pub fn event_sender(&self) -> mpsc::UnboundedSender<Event> {
        self.inner.event_tx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    pub fn is_under_execution(&self, id: &ResourceId) -> bool {
        self.inner.state.lock().under_execution.contains(id)
    }

    /// Whether an unconsumed notification will trigger another execution
    pub fn is_next_reconciliation_imminent(&self, id: &ResourceId) -> bool {
        self.inner.state.lock().markers.event_present(id)
    }

    /// Retry metadata of the current failure chain, if any
    pub fn retry_info(&self, id: &ResourceId) -> Option<RetryInfo> {
        self.inner
            .state
            .lock()
            .retry_state
            .get(id)
            .map(RetryExecution::info)
    }

    pub fn has_scheduled_timer(&self, id: &ResourceId) -> bool {
        self.inner.timer.is_scheduled(id)
    }

    /// Whether the scheduler holds any per-resource state for `id`
    pub fn is_tracking(&self, id: &ResourceId) -> bool {
        let state = self.inner.state.lock();
        state.markers.mark(id) != Default::default()
            || state.under_execution.contains(id)
            || state.retry_state.contains_key(id)
            || self.inner.timer.is_scheduled(id)
    }
}

async fn run_scheduler_loop(
    inner: Weak<SchedulerInner>,
    mut events: mpsc::UnboundedReceiver<Event>,
    mut completions: mpsc::UnboundedReceiver<ExecutionCompletion>,
) {
    debug!("Scheduler loop started");
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.handle_event(event);
            }
            Some(completion) = completions.recv() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.on_execution_finished(completion);
            }
            else => break,
        }
    }
    debug!("Scheduler loop exited");
}

impl SchedulerInner {
    fn handle_event(&self, event: Event) {
        let mut state = self.state.lock();
        if !state.running {
            debug!(event = %event, "Skipping event, scheduler not running");
            return;
        }
        self.metrics.received_event(&event);
        let id = event.resource_id().clone();

        if event.is_delete() {
            debug!(resource_id = %id, "Marking delete event received");
            state.markers.mark_delete_event_received(&id);
        } else if state.markers.processed_mark_for_deletion_present(&id) {
            if self.cache.get(&id).is_some_and(|r| r.deletion_requested) {
                debug!(
                    resource_id = %id,
                    "Skipping event, resource already processed for deletion"
                );
                return;
            }
            // Finalizer was removed but the resource came back: treat as new
            state.markers.clear_processed_for_deletion(&id);
            state.markers.mark_event_received(&id);
        } else if !state.markers.mark_event_received(&id) {
            debug!(resource_id = %id, "Skipping event mark, delete event pending");
        }

        self.try_schedule_execution(&mut state, &id);
    }

    fn try_schedule_execution(&self, state: &mut SchedulerState, id: &ResourceId) {
        if state.under_execution.contains(id) {
            debug!(resource_id = %id, "Resource under execution, deferring");
            return;
        }

        let delete_pending = state.markers.delete_event_present(id);
        if !delete_pending && !state.markers.event_present(id) {
            return;
        }

        let Some(resource) = self.cache.get(id) else {
            if delete_pending {
                self.cleanup_for_deleted_resource(state, id);
            } else {
                debug!(resource_id = %id, "No resource found in cache, dropping event");
                state.markers.un_mark_event_received(id);
                state.retry_state.remove(id);
                self.timer.cancel(id);
            }
            return;
        };

        state.under_execution.insert(id.clone());
        state.markers.un_mark_event_received(id);
        let retry_info = state.retry_state.get(id).map(RetryExecution::info);
        let scope = ExecutionScope::new(resource, retry_info);

        self.metrics
            .reconcile_resource(&scope.resource, scope.retry_info.as_ref());
        debug!(
            execution_id = %scope.execution_id,
            scope = %scope,
            "Submitting execution"
        );
        self.submit(scope);
    }

    fn submit(&self, scope: ExecutionScope) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let permits = Arc::clone(&self.permits);
        let metrics = Arc::clone(&self.metrics);
        let completions = self.completion_tx.clone();

        self.runtime.spawn(async move {
            let outcome = match permits.acquire_owned().await {
                Ok(permit) => {
                    metrics.execution_started(scope.resource_id());
                    let outcome = execute_guarded(&dispatcher, &scope).await;
                    metrics.execution_finished(scope.resource_id());
                    drop(permit);
                    outcome
                }
                Err(e) => PostExecutionControl::failed(ReconcilerError::Scheduler(format!(
                    "worker pool closed: {e}"
                ))),
            };

            if completions
                .send(ExecutionCompletion { scope, outcome })
                .is_err()
            {
                debug!("Execution finished after scheduler shut down");
            }
        });
    }

    fn on_execution_finished(&self, completion: ExecutionCompletion) {
        let ExecutionCompletion { scope, outcome } = completion;
        let id = scope.resource_id().clone();
        let mut state = self.state.lock();
        if !state.running {
            debug!(resource_id = %id, "Skipping post-execution bookkeeping, scheduler stopped");
            return;
        }

        debug!(
            execution_id = %scope.execution_id,
            scope = %scope,
            outcome = outcome.kind(),
            "Execution finished"
        );
        state.under_execution.remove(&id);

        let delete_pending = state.markers.delete_event_present(&id);
        if let Some(error) = outcome.error() {
            self.metrics.failed_reconciliation(&id, error);
            if !self.retry_policy.is_enabled() {
                error!(
                    resource_id = %id,
                    error = %error,
                    "Error during reconciliation, retry not configured"
                );
            } else if !delete_pending {
                self.handle_retry_on_failure(&mut state, &scope, error);
                return;
            }
        } else {
            self.metrics.finished_reconciliation(&id);
        }

        state.retry_state.remove(&id);
        self.timer.cancel(&id);

        if delete_pending {
            if !outcome.is_failed()
                || outcome.is_finalizer_removed()
                || self.cache.get(&id).is_none()
            {
                self.cleanup_for_deleted_resource(&mut state, &id);
                return;
            }
        } else if outcome.is_finalizer_removed() {
            debug!(resource_id = %id, "Finalizer removed, marking processed for deletion");
            state.markers.mark_processed_for_deletion(&id);
            self.metrics.cleanup_done_for(&id);
            return;
        }

        if state.markers.event_present(&id) {
            let cached_version = self.cache.get(&id).map(|r| r.version);
            if is_cache_ready_for_instant_reconciliation(&scope, &outcome, cached_version.as_ref())
            {
                self.try_schedule_execution(&mut state, &id);
            } else {
                debug!(
                    resource_id = %id,
                    version = %scope.version(),
                    "Cache not yet showing our write, whitelisting next event"
                );
                self.watch.whitelist_next_event(&id);
            }
        } else if let Some(delay) = outcome.reschedule_after() {
            debug!(
                resource_id = %id,
                delay_ms = delay.as_millis() as u64,
                "Rescheduling reconciliation"
            );
            self.timer.schedule_once(&id, delay);
        } else {
            self.schedule_for_max_reconciliation_interval(&id);
        }
    }

    fn handle_retry_on_failure(
        &self,
        state: &mut SchedulerState,
        scope: &ExecutionScope,
        error: &ReconcilerError,
    ) {
        let id = scope.resource_id();
        let event_present = state.markers.event_present(id);
        let policy = &self.retry_policy;
        let retry = state
            .retry_state
            .entry(id.clone())
            .or_insert_with(|| RetryExecution::new(policy.clone()));

        let last_attempt = retry.is_last_attempt();
        if !last_attempt && error.is_conflict() {
            info!(
                resource_id = %id,
                error = %error,
                "Conflict during reconciliation, will retry"
            );
        } else if event_present || !last_attempt {
            warn!(
                resource_id = %id,
                error = %error,
                attempt = retry.attempt_count(),
                "Error during reconciliation, another attempt will follow"
            );
        } else {
            error!(
                resource_id = %id,
                error = %error,
                attempt = retry.attempt_count(),
                "Error during reconciliation on last retry attempt"
            );
        }

        if event_present {
            debug!(resource_id = %id, "Newer event present, rescheduling immediately");
            self.try_schedule_execution(state, id);
            return;
        }

        match retry.next_delay() {
            Some(delay) => {
                debug!(
                    resource_id = %id,
                    delay_ms = delay.as_millis() as u64,
                    attempt = retry.attempt_count(),
                    "Scheduling retry"
                );
                self.timer.schedule_once(id, delay);
            }
            None => {
                error!(
                    resource_id = %id,
                    attempts = retry.attempt_count(),
                    "Exhausted retries"
                );
                state.retry_state.remove(id);
                self.schedule_for_max_reconciliation_interval(id);
            }
        }
    }

    fn schedule_for_max_reconciliation_interval(&self, id: &ResourceId) {
        if let Some(interval) = self.max_reconciliation_interval {
            debug!(
                resource_id = %id,
                delay_ms = interval.as_millis() as u64,
                "Scheduling reconciliation for max reconciliation interval"
            );
            self.timer.schedule_once(id, interval);
        }
    }

    fn cleanup_for_deleted_resource(&self, state: &mut SchedulerState, id: &ResourceId) {
        debug!(resource_id = %id, "Cleaning up state for deleted resource");
        state.markers.cleanup(id);
        state.retry_state.remove(id);
        self.timer.cancel(id);
        self.watch.cleanup_for_resource(id);
        self.metrics.cleanup_done_for(id);
    }
}

/// Run the dispatcher, converting a panic in user code into a failed outcome
async fn execute_guarded(
    dispatcher: &ReconciliationDispatcher,
    scope: &ExecutionScope,
) -> PostExecutionControl {
    match AssertUnwindSafe(dispatcher.handle_execution(scope))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            error!(scope = %scope, panic = %message, "Reconciler panicked");
            PostExecutionControl::failed(ReconcilerError::Panicked(message))
        }
    }
}

/// Assembles a [`Scheduler`] and its collaborators
pub struct SchedulerBuilder {
    config: ReconcilerConfig,
    reconciler: Option<Arc<dyn Reconciler>>,
    cleaner: Option<Arc<dyn Cleaner>>,
    error_status_handler: Option<Arc<dyn ErrorStatusHandler>>,
    store: Option<Arc<dyn RemoteStore>>,
    cache: Option<Arc<dyn ResourceCache>>,
    watch: Arc<dyn WatchLayer>,
    metrics: Arc<dyn Metrics>,
    timer: Option<Arc<dyn TimerSource>>,
    retry_policy: Option<RetryPolicy>,
    event_tx: mpsc::UnboundedSender<Event>,
    event_rx: mpsc::UnboundedReceiver<Event>,
}

impl SchedulerBuilder {
    pub fn new(config: ReconcilerConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            config,
            reconciler: None,
            cleaner: None,
            error_status_handler: None,
            store: None,
            cache: None,
            watch: Arc::new(NoopWatchLayer),
            metrics: Arc::new(NoopMetrics),
            timer: None,
            retry_policy: None,
            event_tx,
            event_rx,
        }
    }

    pub fn reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Registering a cleaner turns on finalizer management
    pub fn cleaner(mut self, cleaner: Arc<dyn Cleaner>) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    pub fn error_status_handler(mut self, handler: Arc<dyn ErrorStatusHandler>) -> Self {
        self.error_status_handler = Some(handler);
        self
    }

    pub fn store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ResourceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn watch_layer(mut self, watch: Arc<dyn WatchLayer>) -> Self {
        self.watch = watch;
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the default [`TokioTimerSource`]
    ///
    /// A custom source must deliver firings as [`Event::Timer`] through
    /// [`SchedulerBuilder::event_sender`].
    pub fn timer_source(mut self, timer: Arc<dyn TimerSource>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Override the policy derived from the `retry` configuration section
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn event_sender(&self) -> mpsc::UnboundedSender<Event> {
        self.event_tx.clone()
    }

    /// Validate the configuration and wire the scheduler
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Scheduler> {
        self.config.validate()?;
        let reconciler = self
            .reconciler
            .ok_or_else(|| ReconcilerError::configuration("a reconciler is required"))?;
        let store = self
            .store
            .ok_or_else(|| ReconcilerError::configuration("a remote store is required"))?;
        let cache = self
            .cache
            .ok_or_else(|| ReconcilerError::configuration("a resource cache is required"))?;
        let runtime = Handle::try_current()
            .map_err(|e| ReconcilerError::Scheduler(format!("no tokio runtime available: {e}")))?;

        let retry_policy = self
            .retry_policy
            .unwrap_or_else(|| RetryPolicy::from_config(&self.config.retry));
        let mut dispatcher = ReconciliationDispatcher::new(&self.config, reconciler, store)
            .with_retry_policy(&retry_policy);
        if let Some(cleaner) = self.cleaner {
            dispatcher = dispatcher.with_cleaner(cleaner);
        }
        if let Some(handler) = self.error_status_handler {
            dispatcher = dispatcher.with_error_status_handler(handler);
        }

        let timer = self.timer.unwrap_or_else(|| {
            Arc::new(TokioTimerSource::new(runtime.clone(), self.event_tx.clone()))
        });
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        debug!(
            controller = %self.config.controller_name,
            uses_finalizer = dispatcher.uses_finalizer(),
            finalizer = %dispatcher.finalizer(),
            retry_policy = ?retry_policy,
            "Scheduler built"
        );

        Ok(Scheduler {
            inner: Arc::new(SchedulerInner {
                controller_name: self.config.controller_name.clone(),
                max_reconciliation_interval: self.config.max_reconciliation_interval(),
                retry_policy,
                dispatcher: Arc::new(dispatcher),
                cache,
                timer,
                watch: self.watch,
                metrics: self.metrics,
                state: Mutex::new(SchedulerState::default()),
                permits: Arc::new(Semaphore::new(self.config.max_concurrent_reconciliations)),
                runtime,
                event_tx: self.event_tx,
                completion_tx,
                loop_channels: Mutex::new(Some((self.event_rx, completion_rx))),
            }),
        })
    }
}
