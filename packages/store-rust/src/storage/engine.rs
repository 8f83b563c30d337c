//! Storage engine trait for the store's versioned tables.
//!
//! Defines [`StorageEngine`], the layer that owns the current
//! [`StoreSnapshot`] and publishes new ones. Readers take a snapshot and work
//! against it without locking; writers hand the engine whole replacement
//! tables, which become visible together.

use std::sync::Arc;

use entitygraph_core::EntityTable;

use super::snapshot::StoreSnapshot;

/// Owner of the store's table snapshots.
///
/// Implementations must publish each commit atomically: a reader sees either
/// all of a commit's tables or none of them. Every published table receives
/// a version that was never handed out before.
///
/// Wrapped in `Arc<dyn StorageEngine>` so the store can be shared.
pub trait StorageEngine: Send + Sync + 'static {
    /// Returns the current snapshot.
    fn snapshot(&self) -> Arc<StoreSnapshot>;

    /// Returns `true` if `model` has a table.
    fn has_table(&self, model: &str) -> bool;

    /// Creates an empty table for `model`. Returns `false` if it already
    /// exists, in which case nothing changes.
    fn create_table(&self, model: &str) -> bool;

    /// Replaces the named tables in one atomic step and returns the
    /// resulting snapshot. An empty `tables` list publishes nothing.
    fn commit(&self, tables: Vec<(String, EntityTable)>) -> Arc<StoreSnapshot>;

    /// Replaces every non-empty table with an empty one in one atomic step.
    ///
    /// Returns the names of the tables that were replaced, sorted. Tables
    /// that already held no slots keep their version.
    fn reset_all(&self) -> Vec<String>;
}
