//! In-process stand-in for a cluster: an optimistic-locking store whose writes
//! are reflected into the resource cache and announced to the scheduler, the way
//! a watch layer would. Writes that change nothing produce no notification.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use reconciler_core::{
    Cleaner, ErrorStatusHandler, InMemoryRemoteStore, InMemoryResourceCache, ReconcileMetrics,
    Reconciler, ReconcilerConfig, RemoteStore, ResourceCache, ResourceId, ResourceSnapshot,
    ResourceVersion, RetryPolicy, Scheduler, StoreError, WatchLayer, WriteRecord,
};

pub struct FakeCluster {
    store: InMemoryRemoteStore,
    pub cache: Arc<InMemoryResourceCache>,
    scheduler: OnceLock<Scheduler>,
    auto_sync: AtomicBool,
    pending: Mutex<Vec<ResourceId>>,
    whitelisted: Mutex<Vec<ResourceId>>,
    cleaned_up: Mutex<Vec<ResourceId>>,
}

impl FakeCluster {
    /// Versions handed out start at "100"
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: InMemoryRemoteStore::with_initial_version(99),
            cache: Arc::new(InMemoryResourceCache::new()),
            scheduler: OnceLock::new(),
            auto_sync: AtomicBool::new(true),
            pending: Mutex::new(Vec::new()),
            whitelisted: Mutex::new(Vec::new()),
            cleaned_up: Mutex::new(Vec::new()),
        })
    }

    pub fn attach(&self, scheduler: Scheduler) {
        let _ = self.scheduler.set(scheduler);
    }

    pub fn create(&self, resource: ResourceSnapshot) -> ResourceSnapshot {
        let created = self.store.create(resource);
        self.observe(&created.id);
        created
    }

    pub fn request_deletion(&self, id: &ResourceId) {
        self.store.request_deletion(id);
        self.observe(id);
    }

    pub fn get(&self, id: &ResourceId) -> Option<ResourceSnapshot> {
        self.store.get(id)
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.store.writes()
    }

    pub fn cached_version(&self, id: &ResourceId) -> Option<ResourceVersion> {
        self.cache.get(id).map(|r| r.version)
    }

    /// When off, changes are held back until [`FakeCluster::deliver_pending`]
    pub fn set_auto_sync(&self, enabled: bool) {
        self.auto_sync.store(enabled, Ordering::SeqCst);
    }

    pub fn deliver_pending(&self) {
        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        for id in pending {
            self.sync(&id);
        }
    }

    pub fn whitelisted(&self) -> Vec<ResourceId> {
        self.whitelisted.lock().clone()
    }

    pub fn cleaned_up(&self) -> Vec<ResourceId> {
        self.cleaned_up.lock().clone()
    }

    fn observe(&self, id: &ResourceId) {
        if self.auto_sync.load(Ordering::SeqCst) {
            self.sync(id);
        } else {
            self.pending.lock().push(id.clone());
        }
    }

    fn sync(&self, id: &ResourceId) {
        let is_delete = match self.store.get(id) {
            Some(current) => {
                self.cache.upsert(current);
                false
            }
            None => {
                self.cache.remove(id);
                true
            }
        };
        if let Some(scheduler) = self.scheduler.get() {
            scheduler.notify(id, is_delete);
        }
    }
}

#[async_trait]
impl RemoteStore for FakeCluster {
    async fn update(
        &self,
        resource: &ResourceSnapshot,
        expected_version: &ResourceVersion,
    ) -> Result<ResourceSnapshot, StoreError> {
        let updated = self.store.update(resource, expected_version).await?;
        if &updated.version != expected_version {
            self.observe(&resource.id);
        }
        Ok(updated)
    }

    async fn update_status(
        &self,
        resource: &ResourceSnapshot,
    ) -> Result<ResourceSnapshot, StoreError> {
        let updated = self.store.update_status(resource).await?;
        if updated.version != resource.version {
            self.observe(&resource.id);
        }
        Ok(updated)
    }
}

impl WatchLayer for FakeCluster {
    fn whitelist_next_event(&self, id: &ResourceId) {
        self.whitelisted.lock().push(id.clone());
    }

    fn cleanup_for_resource(&self, id: &ResourceId) {
        self.cleaned_up.lock().push(id.clone());
    }
}

/// Scheduler wired to a [`FakeCluster`]
pub struct TestHarness {
    pub cluster: Arc<FakeCluster>,
    pub scheduler: Scheduler,
    pub metrics: ReconcileMetrics,
}

pub struct HarnessBuilder {
    config: ReconcilerConfig,
    cleaner: Option<Arc<dyn Cleaner>>,
    error_status_handler: Option<Arc<dyn ErrorStatusHandler>>,
    retry_policy: RetryPolicy,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            config: ReconcilerConfig {
                controller_name: "test-controller".to_string(),
                ..Default::default()
            },
            cleaner: None,
            error_status_handler: None,
            retry_policy: RetryPolicy::disabled(),
        }
    }
}

impl HarnessBuilder {
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cleaner(mut self, cleaner: Arc<dyn Cleaner>) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    pub fn error_status_handler(mut self, handler: Arc<dyn ErrorStatusHandler>) -> Self {
        self.error_status_handler = Some(handler);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn start(self, reconciler: Arc<dyn Reconciler>) -> TestHarness {
        let cluster = FakeCluster::new();
        let metrics = ReconcileMetrics::new();

        let mut builder = Scheduler::builder(self.config)
            .reconciler(reconciler)
            .store(cluster.clone())
            .cache(cluster.cache.clone())
            .watch_layer(cluster.clone())
            .metrics(Arc::new(metrics.clone()))
            .retry_policy(self.retry_policy);
        if let Some(cleaner) = self.cleaner {
            builder = builder.cleaner(cleaner);
        }
        if let Some(handler) = self.error_status_handler {
            builder = builder.error_status_handler(handler);
        }

        let scheduler = builder.build().expect("scheduler should build");
        cluster.attach(scheduler.clone());
        scheduler.start();

        TestHarness {
            cluster,
            scheduler,
            metrics,
        }
    }
}

impl TestHarness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn executions(&self) -> u64 {
        self.metrics.snapshot().executions_started
    }
}
