//! # Event Marker
//!
//! Per-resource bookkeeping of *whether* something happened, never *what*.
//!
//! Any number of notifications arriving while a resource is executing collapse
//! into a single `dirty` bit, so memory stays bounded regardless of event volume
//! and the next execution always works on the latest cached state.
//!
//! ## Invariants
//!
//! - `delete_pending` is only cleared by [`EventMarker::cleanup`]
//! - while `delete_pending` is set, `dirty` is never set by ordinary notifications
//! - `dirty` is cleared exactly when an execution is submitted

use std::collections::HashMap;

use crate::resource::ResourceId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventMark {
    pub dirty: bool,
    pub delete_pending: bool,
    /// Our own write removed the finalizer of a resource marked for deletion
    pub processed_mark_for_deletion: bool,
}

impl EventMark {
    fn is_clear(&self) -> bool {
        !self.dirty && !self.delete_pending && !self.processed_mark_for_deletion
    }
}

/// Not thread-safe on purpose: owned by the scheduler and mutated only under
/// its bookkeeping lock
#[derive(Debug, Default)]
pub struct EventMarker {
    marks: HashMap<ResourceId, EventMark>,
}

impl EventMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, id: &ResourceId) -> EventMark {
        self.marks.get(id).copied().unwrap_or_default()
    }

    /// Mark an ordinary change; ignored while a deletion is pending
    ///
    /// Returns whether the resource is now dirty.
    pub fn mark_event_received(&mut self, id: &ResourceId) -> bool {
        let mark = self.marks.entry(id.clone()).or_default();
        if mark.delete_pending {
            return false;
        }
        mark.dirty = true;
        true
    }

    pub fn mark_delete_event_received(&mut self, id: &ResourceId) {
        let mark = self.marks.entry(id.clone()).or_default();
        mark.delete_pending = true;
        mark.dirty = false;
    }

    pub fn mark_processed_for_deletion(&mut self, id: &ResourceId) {
        self.marks
            .entry(id.clone())
            .or_default()
            .processed_mark_for_deletion = true;
    }

    pub fn clear_processed_for_deletion(&mut self, id: &ResourceId) {
        if let Some(mark) = self.marks.get_mut(id) {
            mark.processed_mark_for_deletion = false;
        }
        self.remove_if_clear(id);
    }

    pub fn un_mark_event_received(&mut self, id: &ResourceId) {
        if let Some(mark) = self.marks.get_mut(id) {
            mark.dirty = false;
        }
        self.remove_if_clear(id);
    }

    pub fn event_present(&self, id: &ResourceId) -> bool {
        self.mark(id).dirty
    }

    pub fn delete_event_present(&self, id: &ResourceId) -> bool {
        self.mark(id).delete_pending
    }

    pub fn processed_mark_for_deletion_present(&self, id: &ResourceId) -> bool {
        self.mark(id).processed_mark_for_deletion
    }

    /// Resources with an unconsumed change
    pub fn resources_with_event_present(&self) -> Vec<ResourceId> {
        self.marks
            .iter()
            .filter(|(_, mark)| mark.dirty)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Forget everything about `id`; the only way `delete_pending` is cleared
    pub fn cleanup(&mut self, id: &ResourceId) {
        self.marks.remove(id);
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    fn remove_if_clear(&mut self, id: &ResourceId) {
        if self.marks.get(id).is_some_and(EventMark::is_clear) {
            self.marks.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foo() -> ResourceId {
        ResourceId::namespaced("ns1", "foo")
    }

    #[test]
    fn test_repeated_events_coalesce() {
        let mut marker = EventMarker::new();
        for _ in 0..10 {
            assert!(marker.mark_event_received(&foo()));
        }
        assert!(marker.event_present(&foo()));
        assert_eq!(marker.len(), 1);

        marker.un_mark_event_received(&foo());
        assert!(!marker.event_present(&foo()));
        assert!(marker.is_empty());
    }

    #[test]
    fn test_pending_delete_suppresses_dirty() {
        let mut marker = EventMarker::new();
        marker.mark_event_received(&foo());
        marker.mark_delete_event_received(&foo());

        assert!(marker.delete_event_present(&foo()));
        assert!(!marker.event_present(&foo()));
        assert!(!marker.mark_event_received(&foo()));
        assert!(!marker.event_present(&foo()));

        // Consuming events does not clear the deletion
        marker.un_mark_event_received(&foo());
        assert!(marker.delete_event_present(&foo()));

        marker.cleanup(&foo());
        assert!(!marker.delete_event_present(&foo()));
        assert!(marker.is_empty());
    }

    #[test]
    fn test_processed_mark_for_deletion() {
        let mut marker = EventMarker::new();
        marker.mark_processed_for_deletion(&foo());
        assert!(marker.processed_mark_for_deletion_present(&foo()));
        assert!(marker.resources_with_event_present().is_empty());

        marker.clear_processed_for_deletion(&foo());
        assert!(!marker.processed_mark_for_deletion_present(&foo()));
        assert!(marker.is_empty());
    }
}
