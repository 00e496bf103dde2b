use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use reconciler_core::{
    Context, EventMarker, InMemoryRemoteStore, InMemoryResourceCache, Reconciler,
    ReconcileMetrics, ReconcilerConfig, ResourceCache, ResourceId, ResourceSnapshot, RetryPolicy,
    Scheduler, UpdateControl,
};

struct NoopReconciler;

#[async_trait::async_trait]
impl Reconciler for NoopReconciler {
    async fn reconcile(
        &self,
        _resource: ResourceSnapshot,
        _context: &Context,
    ) -> reconciler_core::Result<UpdateControl> {
        Ok(UpdateControl::no_update())
    }
}

fn benchmark_marker_churn(c: &mut Criterion) {
    let ids: Vec<_> = (0..1_000)
        .map(|i| ResourceId::namespaced("bench", format!("r{i}")))
        .collect();

    c.bench_function("marker_mark_unmark_1000", |b| {
        b.iter(|| {
            let mut markers = EventMarker::default();
            for id in &ids {
                markers.mark_event_received(id);
            }
            for id in &ids {
                markers.un_mark_event_received(id);
            }
            black_box(markers.is_empty())
        })
    });
}

fn benchmark_notify_to_completion(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let ids: Vec<_> = (0..100)
        .map(|i| ResourceId::namespaced("bench", format!("r{i}")))
        .collect();

    c.bench_function("notify_100_resources_to_completion", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let cache = Arc::new(InMemoryResourceCache::new());
                for id in &ids {
                    cache.upsert(ResourceSnapshot::new(id.clone(), "1"));
                }
                let metrics = ReconcileMetrics::new();
                let scheduler = Scheduler::builder(ReconcilerConfig::default())
                    .reconciler(Arc::new(NoopReconciler))
                    .store(Arc::new(InMemoryRemoteStore::new()))
                    .cache(cache)
                    .metrics(Arc::new(metrics.clone()))
                    .retry_policy(RetryPolicy::disabled())
                    .build()
                    .expect("scheduler");
                scheduler.start();

                for id in &ids {
                    scheduler.notify(id, false);
                }
                while metrics.snapshot().reconciliations_succeeded < ids.len() as u64 {
                    tokio::task::yield_now().await;
                }
                scheduler.stop();
            })
        })
    });
}

criterion_group!(benches, benchmark_marker_churn, benchmark_notify_to_completion);
criterion_main!(benches);
