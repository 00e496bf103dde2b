//! Reconcilers and cleaners that record what they were asked to do.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use reconciler_core::{
    Cleaner, Context, DeleteControl, Reconciler, ReconcilerError, ResourceId, ResourceSnapshot,
    Result, UpdateControl,
};

type Decision = Box<dyn Fn(ResourceSnapshot, &Context) -> Result<UpdateControl> + Send + Sync>;

pub struct RecordingReconciler {
    decision: Decision,
    work: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<(ResourceSnapshot, Context)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    in_flight_per_resource: Mutex<HashMap<ResourceId, usize>>,
    max_in_flight_per_resource: AtomicUsize,
}

impl RecordingReconciler {
    pub fn new(
        decision: impl Fn(ResourceSnapshot, &Context) -> Result<UpdateControl> + Send + Sync + 'static,
    ) -> Self {
        Self {
            decision: Box::new(decision),
            work: None,
            gate: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            in_flight_per_resource: Mutex::new(HashMap::new()),
            max_in_flight_per_resource: AtomicUsize::new(0),
        }
    }

    pub fn no_update() -> Self {
        Self::new(|_, _| Ok(UpdateControl::no_update()))
    }

    pub fn always_failing() -> Self {
        Self::new(|resource, _| Err(ReconcilerError::reconcile_failed(&resource.id, "boom")))
    }

    /// Simulate work taking `duration`
    pub fn with_work(mut self, duration: Duration) -> Self {
        self.work = Some(duration);
        self
    }

    /// Block every execution until a permit is added to `gate`
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn contexts(&self) -> Vec<Context> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn seen(&self) -> Vec<ResourceSnapshot> {
        self.calls.lock().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight_per_resource(&self) -> usize {
        self.max_in_flight_per_resource.load(Ordering::SeqCst)
    }

    fn enter(&self, id: &ResourceId) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let mut per_resource = self.in_flight_per_resource.lock();
        let count = per_resource.entry(id.clone()).or_default();
        *count += 1;
        self.max_in_flight_per_resource
            .fetch_max(*count, Ordering::SeqCst);
    }

    fn exit(&self, id: &ResourceId) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.in_flight_per_resource.lock().get_mut(id) {
            *count -= 1;
        }
    }
}

#[async_trait]
impl Reconciler for RecordingReconciler {
    async fn reconcile(&self, resource: ResourceSnapshot, context: &Context) -> Result<UpdateControl> {
        self.enter(&resource.id);
        self.calls.lock().push((resource.clone(), context.clone()));

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if let Some(work) = self.work {
            tokio::time::sleep(work).await;
        }

        let decision = (self.decision)(resource.clone(), context);
        self.exit(&resource.id);
        decision
    }
}

#[derive(Default)]
pub struct RecordingCleaner {
    calls: AtomicUsize,
}

impl RecordingCleaner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Cleaner for RecordingCleaner {
    async fn cleanup(&self, _resource: ResourceSnapshot, _context: &Context) -> Result<DeleteControl> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DeleteControl::default_delete())
    }
}
