//! Change observer trait and composite implementation.
//!
//! Defines [`ChangeObserver`] for reacting to committed changes in a
//! [`ModelStore`](crate::ModelStore), and [`CompositeChangeObserver`] which
//! fans notifications out to every subscriber.
//!
//! Observers are only called after a commit has been published, and never
//! for writes that left every table unchanged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use entitygraph_core::RecordId;

/// Observer for committed store changes.
///
/// Used as `Arc<dyn ChangeObserver>`.
pub trait ChangeObserver: Send + Sync {
    /// Called after a write to `model` committed. `ids` are the top-level
    /// ids written, `tables` every table the commit replaced.
    fn on_write(&self, model: &str, ids: &[RecordId], tables: &[String]);

    /// Called after records of `model` were removed.
    fn on_remove(&self, model: &str, ids: &[RecordId]);

    /// Called after tombstones of `model` were pruned.
    fn on_prune(&self, model: &str, ids: &[RecordId]);

    /// Called after a reset emptied `tables`.
    fn on_reset(&self, tables: &[String]);
}

/// Handle returned by [`CompositeChangeObserver::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Composite observer that fans out to every subscribed observer.
///
/// Subscribers can be added and removed concurrently with notifications.
/// Each notification goes to the subscribers present when it started.
#[derive(Default)]
pub struct CompositeChangeObserver {
    observers: DashMap<ObserverId, Arc<dyn ChangeObserver>>,
    next_id: AtomicU64,
}

impl CompositeChangeObserver {
    /// Creates a composite with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `observer` and returns the handle that unsubscribes it.
    pub fn add(&self, observer: Arc<dyn ChangeObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.insert(id, observer);
        id
    }

    /// Unsubscribes the observer behind `id`. Returns `false` if it was
    /// already gone.
    pub fn remove(&self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns `true` if nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    // Collected up front so observers may subscribe or unsubscribe from
    // inside a callback without deadlocking on a shard lock.
    fn current(&self) -> Vec<Arc<dyn ChangeObserver>> {
        let mut entries: Vec<(ObserverId, Arc<dyn ChangeObserver>)> = self
            .observers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, observer)| observer).collect()
    }
}

impl ChangeObserver for CompositeChangeObserver {
    fn on_write(&self, model: &str, ids: &[RecordId], tables: &[String]) {
        for observer in self.current() {
            observer.on_write(model, ids, tables);
        }
    }

    fn on_remove(&self, model: &str, ids: &[RecordId]) {
        for observer in self.current() {
            observer.on_remove(model, ids);
        }
    }

    fn on_prune(&self, model: &str, ids: &[RecordId]) {
        for observer in self.current() {
            observer.on_prune(model, ids);
        }
    }

    fn on_reset(&self, tables: &[String]) {
        for observer in self.current() {
            observer.on_reset(tables);
        }
    }
}
