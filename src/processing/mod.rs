//! # Processing
//!
//! Execution pipeline: the [`Scheduler`] decides when a resource runs, the
//! [`ReconciliationDispatcher`] decides what a single run does.

pub mod cache_sync;
pub mod dispatcher;
pub mod execution_scope;
pub mod post_execution;
pub mod scheduler;

pub use cache_sync::is_cache_ready_for_instant_reconciliation;
pub use dispatcher::ReconciliationDispatcher;
pub use execution_scope::ExecutionScope;
pub use post_execution::PostExecutionControl;
pub use scheduler::{Scheduler, SchedulerBuilder};
