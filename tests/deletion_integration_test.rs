mod common;

use common::*;
use std::sync::Arc;
use tokio::sync::Semaphore;

use reconciler_core::{ResourceId, ResourceSnapshot, WriteKind};

async fn created_with_finalizer(
    reconciler: Arc<RecordingReconciler>,
    cleaner: Arc<RecordingCleaner>,
) -> TestHarness {
    let harness = TestHarness::builder()
        .cleaner(cleaner)
        .start(reconciler.clone());
    harness.cluster.create(ResourceSnapshot::new(foo(), "0"));
    assert!(eventually(|| reconciler.call_count() == 1).await);
    quiesce().await;
    harness
}

#[tokio::test(start_paused = true)]
async fn test_delete_removes_finalizer_once_and_clears_state() {
    let reconciler = Arc::new(RecordingReconciler::no_update());
    let cleaner = Arc::new(RecordingCleaner::new());
    let harness = created_with_finalizer(reconciler.clone(), cleaner.clone()).await;
    let writes_before = harness.cluster.writes().len();

    harness.cluster.request_deletion(&foo());
    assert!(eventually(|| harness.cluster.get(&foo()).is_none()).await);
    quiesce().await;

    assert_eq!(cleaner.call_count(), 1);
    assert_eq!(reconciler.call_count(), 1);

    let deletion_writes = &harness.cluster.writes()[writes_before..];
    assert_eq!(deletion_writes.len(), 1);
    assert_eq!(deletion_writes[0].kind, WriteKind::Update);

    assert_eq!(harness.cluster.cleaned_up(), vec![foo()]);
    assert_eq!(harness.metrics.snapshot().cleanups_completed, 1);
    assert!(!harness.scheduler.is_tracking(&foo()));
}

#[tokio::test(start_paused = true)]
async fn test_delete_of_uncached_resource_cleans_up_without_execution() {
    let reconciler = Arc::new(RecordingReconciler::no_update());
    let harness = TestHarness::builder().start(reconciler.clone());
    let ghost = ResourceId::namespaced("ns1", "ghost");

    harness.scheduler.notify(&ghost, true);
    quiesce().await;

    assert_eq!(harness.executions(), 0);
    assert_eq!(harness.cluster.cleaned_up(), vec![ghost.clone()]);
    assert!(!harness.scheduler.is_tracking(&ghost));
}

#[tokio::test(start_paused = true)]
async fn test_pending_delete_suppresses_updates() {
    let gate = Arc::new(Semaphore::new(0));
    let reconciler = Arc::new(RecordingReconciler::no_update().with_gate(gate.clone()));
    let harness = TestHarness::builder().start(reconciler.clone());
    harness.cluster.create(ResourceSnapshot::new(foo(), "0"));
    assert!(eventually(|| reconciler.call_count() == 1).await);

    // Without finalizers the resource disappears while the execution runs
    harness.cluster.request_deletion(&foo());
    harness.scheduler.notify(&foo(), false);
    assert!(!harness.scheduler.is_next_reconciliation_imminent(&foo()));

    gate.add_permits(100);
    quiesce().await;

    assert_eq!(reconciler.call_count(), 1);
    assert_eq!(harness.cluster.cleaned_up(), vec![foo()]);
    assert!(!harness.scheduler.is_tracking(&foo()));
}

#[tokio::test(start_paused = true)]
async fn test_update_for_uncached_resource_is_dropped() {
    let reconciler = Arc::new(RecordingReconciler::no_update());
    let harness = TestHarness::builder().start(reconciler.clone());

    harness.scheduler.notify(&foo(), false);
    quiesce().await;

    assert_eq!(harness.executions(), 0);
    assert!(!harness.scheduler.is_tracking(&foo()));
}

#[tokio::test(start_paused = true)]
async fn test_echo_of_finalizer_removal_is_skipped() {
    let reconciler = Arc::new(RecordingReconciler::no_update());
    let cleaner = Arc::new(RecordingCleaner::new());
    let harness = created_with_finalizer(reconciler.clone(), cleaner.clone()).await;

    harness.cluster.request_deletion(&foo());
    // Hold back the notification produced by our own finalizer removal
    harness.cluster.set_auto_sync(false);
    assert!(eventually(|| harness.cluster.get(&foo()).is_none()).await);
    quiesce().await;
    let executions = harness.executions();

    // Cache still shows the resource marked for deletion
    harness.scheduler.notify(&foo(), false);
    quiesce().await;
    assert_eq!(harness.executions(), executions);
    assert!(!harness.scheduler.is_next_reconciliation_imminent(&foo()));

    harness.cluster.deliver_pending();
    quiesce().await;

    assert_eq!(cleaner.call_count(), 1);
    assert_eq!(harness.cluster.cleaned_up(), vec![foo()]);
    assert!(!harness.scheduler.is_tracking(&foo()));
}
