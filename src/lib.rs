#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Reconciler Core
//!
//! Event-driven reconciliation engine for declarative-state controllers.
//!
//! ## Overview
//!
//! Given a remote store of versioned resources and a stream of change
//! notifications about them, the engine makes sure a user-supplied reconciler is
//! invoked often enough, on fresh state, one execution at a time per resource,
//! with retry on failure, and without losing a change that arrived while an
//! execution was already running.
//!
//! ## Architecture
//!
//! The design is level-triggered: notifications only mark a resource dirty, and
//! every execution re-reads the latest snapshot from the local cache. The
//! [`Scheduler`] owns all per-resource bookkeeping behind one lock and feeds a
//! bounded worker pool; the [`ReconciliationDispatcher`] runs the finalizer-gated
//! create/update/delete protocol around user code.
//!
//! ## Key Features
//!
//! - **Single-flight** execution per resource
//! - **Coalescing** of notifications received during an execution
//! - **Finalizer management** sequencing cleanup before deletion
//! - **Retry** with linear or exponential backoff
//! - **Cache freshness check** so a follow-up execution never sees the state
//!   from before our own write
//!
//! ## Module Organization
//!
//! - [`resource`] - Identity, version token and snapshot
//! - [`reconciler`] - Traits user code implements
//! - [`processing`] - Scheduler, dispatcher and execution outcomes
//! - [`events`] - Notification types and per-resource markers
//! - [`retry`] - Backoff policies
//! - [`cache`], [`store`], [`watch`], [`timer`] - Collaborator contracts with
//!   in-process implementations
//! - [`metrics`] - Observability hooks
//! - [`config`], [`error`], [`logging`] - Ambient concerns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use reconciler_core::{
//!     Context, InMemoryRemoteStore, InMemoryResourceCache, Reconciler, ReconcilerConfig,
//!     ResourceSnapshot, Scheduler, UpdateControl,
//! };
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Reconciler for Echo {
//!     async fn reconcile(
//!         &self,
//!         resource: ResourceSnapshot,
//!         _context: &Context,
//!     ) -> reconciler_core::Result<UpdateControl> {
//!         let status = serde_json::json!({ "observed": resource.version.as_str() });
//!         Ok(UpdateControl::update_status(resource.with_status(status)))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let scheduler = Scheduler::builder(ReconcilerConfig::from_env()?)
//!     .reconciler(Arc::new(Echo))
//!     .store(Arc::new(InMemoryRemoteStore::new()))
//!     .cache(Arc::new(InMemoryResourceCache::new()))
//!     .build()?;
//! scheduler.start();
//! # Ok::<(), reconciler_core::ReconcilerError>(())
//! # });
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod processing;
pub mod reconciler;
pub mod resource;
pub mod retry;
pub mod store;
pub mod timer;
pub mod watch;

pub use cache::{InMemoryResourceCache, ResourceCache};
pub use config::{ReconcilerConfig, RetryConfig, RetryPolicyKind};
pub use error::{ReconcilerError, Result, StoreError};
pub use events::{Event, EventMarker, ResourceAction};
pub use metrics::{Metrics, MetricsSnapshot, NoopMetrics, ReconcileMetrics};
pub use processing::{
    ExecutionScope, PostExecutionControl, ReconciliationDispatcher, Scheduler, SchedulerBuilder,
};
pub use reconciler::{
    Cleaner, Context, DeleteControl, ErrorStatusHandler, ErrorStatusUpdateControl, Reconciler,
    UpdateAction, UpdateControl,
};
pub use resource::{ResourceId, ResourceSnapshot, ResourceVersion};
pub use retry::{RetryExecution, RetryInfo, RetryPolicy};
pub use store::{InMemoryRemoteStore, RemoteStore, WriteKind, WriteRecord};
pub use timer::{TimerSource, TokioTimerSource};
pub use watch::{NoopWatchLayer, WatchLayer};
