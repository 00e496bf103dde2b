//! # Cache Freshness Check
//!
//! Decides whether a resource that received notifications during an execution
//! can be reconciled again right away, or whether the local cache still shows
//! the state from before our own write.
//!
//! With `v0` the version the execution started from, `v1` the version our write
//! produced and `vc` the version currently cached:
//!
//! | write performed | `vc`          | ready |
//! |-----------------|---------------|-------|
//! | no              | any           | yes   |
//! | yes             | `v1`          | yes   |
//! | yes             | `v0`          | no    |
//! | yes             | anything else | yes   |
//!
//! A third value means something else changed concurrently, which is safe to
//! reconcile immediately.

use crate::resource::ResourceVersion;

use super::execution_scope::ExecutionScope;
use super::post_execution::PostExecutionControl;

/// `cached_version` is `None` when the resource is no longer cached
pub fn is_cache_ready_for_instant_reconciliation(
    scope: &ExecutionScope,
    outcome: &PostExecutionControl,
    cached_version: Option<&ResourceVersion>,
) -> bool {
    let Some(written) = outcome.updated_resource() else {
        return true;
    };
    let Some(cached_version) = cached_version else {
        // The follow-up scheduling attempt logs and drops the cache miss
        return true;
    };
    cached_version == &written.version || cached_version != scope.version()
}
