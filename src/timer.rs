//! # Timer Source
//!
//! One-shot, cancellable wake-ups keyed by resource.
//!
//! Retries, reschedules and the maximum reconciliation interval all arm a timer
//! through [`TimerSource`]. A firing timer is delivered as [`Event::Timer`] on the
//! scheduler's event channel, so it re-enters through the same path as a watch
//! notification.
//!
//! At most one timer is pending per resource: arming again replaces the previous
//! timer. [`TokioTimerSource`] tags each arm with a generation so that a timer
//! racing with its own replacement never fires.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::events::Event;
use crate::resource::ResourceId;

pub trait TimerSource: Send + Sync {
    /// Arm a wake-up for `id` after `delay`, replacing any pending one
    fn schedule_once(&self, id: &ResourceId, delay: Duration);

    /// Drop the pending wake-up for `id`, if any
    fn cancel(&self, id: &ResourceId);

    /// Whether a wake-up is currently pending for `id`
    fn is_scheduled(&self, id: &ResourceId) -> bool;
}

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    task: AbortHandle,
}

/// Timer source backed by `tokio::time::sleep` tasks
#[derive(Debug)]
pub struct TokioTimerSource {
    runtime: Handle,
    events: mpsc::UnboundedSender<Event>,
    timers: Arc<DashMap<ResourceId, ArmedTimer>>,
    generation: AtomicU64,
}

impl TokioTimerSource {
    pub fn new(runtime: Handle, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            runtime,
            events,
            timers: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Number of pending timers
    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}

impl TimerSource for TokioTimerSource {
    fn schedule_once(&self, id: &ResourceId, delay: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        // Holding the entry keeps a zero-delay timer from firing before it is registered
        let entry = self.timers.entry(id.clone());

        let timers = Arc::clone(&self.timers);
        let events = self.events.clone();
        let resource_id = id.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = timers
                .remove_if(&resource_id, |_, armed| armed.generation == generation)
                .is_some();
            if current && events.send(Event::timer(resource_id.clone())).is_err() {
                debug!(resource_id = %resource_id, "Timer fired after event channel closed");
            }
        });

        let armed = ArmedTimer {
            generation,
            task: task.abort_handle(),
        };
        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(armed);
                previous.task.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(armed);
            }
        }

        debug!(
            resource_id = %id,
            delay_ms = delay.as_millis() as u64,
            "Timer armed"
        );
    }

    fn cancel(&self, id: &ResourceId) {
        if let Some((_, armed)) = self.timers.remove(id) {
            armed.task.abort();
            debug!(resource_id = %id, "Timer cancelled");
        }
    }

    fn is_scheduled(&self, id: &ResourceId) -> bool {
        self.timers.contains_key(id)
    }
}

impl Drop for TokioTimerSource {
    fn drop(&mut self) {
        let pending = self.timers.len();
        for entry in self.timers.iter() {
            entry.value().task.abort();
        }
        self.timers.clear();
        if pending > 0 {
            warn!(pending = pending, "Timer source dropped with pending timers");
        }
    }
}
