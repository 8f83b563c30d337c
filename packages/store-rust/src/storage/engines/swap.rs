//! In-memory [`StorageEngine`] implementation backed by [`ArcSwap`].
//!
//! The current [`StoreSnapshot`] lives behind a single `ArcSwap`, so readers
//! get a consistent multi-table view with one lock-free load. Commits are
//! published with a read-copy-update loop that clones only the table map,
//! never the tables themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use entitygraph_core::EntityTable;

use crate::storage::engine::StorageEngine;
use crate::storage::snapshot::{StoreSnapshot, TableSnapshot};

/// In-memory storage publishing whole snapshots through [`ArcSwap`].
pub struct SwapStorage {
    state: ArcSwap<StoreSnapshot>,
    next_version: AtomicU64,
}

impl SwapStorage {
    /// Creates a new storage with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(StoreSnapshot::empty()),
            next_version: AtomicU64::new(1),
        }
    }

    fn bump_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    fn versioned(&self, table: EntityTable) -> Arc<TableSnapshot> {
        Arc::new(TableSnapshot::new(self.bump_version(), table))
    }
}

impl Default for SwapStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for SwapStorage {
    fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.state.load_full()
    }

    fn has_table(&self, model: &str) -> bool {
        self.state.load().contains(model)
    }

    fn create_table(&self, model: &str) -> bool {
        if self.state.load().contains(model) {
            return false;
        }
        let mut created = false;
        self.state.rcu(|current| {
            created = !current.contains(model);
            if created {
                current.with_tables([(model.to_string(), self.versioned(EntityTable::new()))])
            } else {
                StoreSnapshot::clone(current)
            }
        });
        created
    }

    fn commit(&self, tables: Vec<(String, EntityTable)>) -> Arc<StoreSnapshot> {
        if tables.is_empty() {
            return self.snapshot();
        }
        let versioned: Vec<(String, Arc<TableSnapshot>)> = tables
            .into_iter()
            .map(|(name, table)| (name, self.versioned(table)))
            .collect();
        self.state
            .rcu(|current| current.with_tables(versioned.iter().cloned()));
        self.snapshot()
    }

    fn reset_all(&self) -> Vec<String> {
        let all_empty = self
            .state
            .load()
            .iter()
            .all(|(_, snapshot)| snapshot.table.slot_count() == 0);
        if all_empty {
            return Vec::new();
        }
        let mut cleared = Vec::new();
        self.state.rcu(|current| {
            cleared = current
                .iter()
                .filter(|(_, snapshot)| snapshot.table.slot_count() > 0)
                .map(|(name, _)| name.clone())
                .collect();
            cleared.sort();
            if cleared.is_empty() {
                StoreSnapshot::clone(current)
            } else {
                current.with_tables(
                    cleared
                        .iter()
                        .map(|name| (name.clone(), self.versioned(EntityTable::new()))),
                )
            }
        });
        cleared
    }
}

#[cfg(test)]
mod tests {
    use entitygraph_core::{Record, RecordId};

    use super::*;

    fn table_with(ids: &[&str]) -> EntityTable {
        let mut table = EntityTable::new();
        for id in ids {
            table.merge(RecordId::from(*id), Record::new());
        }
        table
    }

    // ---- Tables ----

    #[test]
    fn create_table_is_idempotent() {
        let storage = SwapStorage::new();
        assert!(storage.create_table("User"));
        let version = storage.snapshot().version_of("User");
        assert!(!storage.create_table("User"));
        assert_eq!(storage.snapshot().version_of("User"), version);
        assert!(storage.has_table("User"));
        assert!(!storage.has_table("Tag"));
    }

    // ---- Commit ----

    #[test]
    fn commit_replaces_only_named_tables() {
        let storage = SwapStorage::new();
        storage.create_table("User");
        storage.create_table("Tag");
        let before = storage.snapshot();

        let after = storage.commit(vec![("User".to_string(), table_with(&["u1"]))]);

        assert!(Arc::ptr_eq(
            before.table_snapshot("Tag").unwrap(),
            after.table_snapshot("Tag").unwrap()
        ));
        assert!(after.version_of("User") > before.version_of("User"));
        assert!(before.table_snapshot("User").unwrap().table.is_empty());
        assert_eq!(after.table_snapshot("User").unwrap().table.len(), 1);
    }

    #[test]
    fn empty_commit_publishes_nothing() {
        let storage = SwapStorage::new();
        storage.create_table("User");
        let before = storage.snapshot();
        let after = storage.commit(Vec::new());
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn versions_are_never_reused() {
        let storage = SwapStorage::new();
        storage.create_table("User");
        let mut seen = vec![storage.snapshot().version_of("User").unwrap()];
        for id in ["u1", "u2", "u3"] {
            let snapshot = storage.commit(vec![("User".to_string(), table_with(&[id]))]);
            seen.push(snapshot.version_of("User").unwrap());
        }
        storage.reset_all();
        seen.push(storage.snapshot().version_of("User").unwrap());

        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    }

    // ---- Reset ----

    #[test]
    fn reset_all_skips_empty_tables() {
        let storage = SwapStorage::new();
        storage.create_table("User");
        storage.create_table("Tag");
        storage.commit(vec![("User".to_string(), table_with(&["u1"]))]);
        let before = storage.snapshot();

        let cleared = storage.reset_all();

        assert_eq!(cleared, vec!["User".to_string()]);
        let after = storage.snapshot();
        assert!(after.table_snapshot("User").unwrap().table.is_empty());
        assert!(Arc::ptr_eq(
            before.table_snapshot("Tag").unwrap(),
            after.table_snapshot("Tag").unwrap()
        ));
    }

    #[test]
    fn reset_all_clears_tombstone_only_tables() {
        let storage = SwapStorage::new();
        storage.create_table("User");
        let mut table = table_with(&["u1"]);
        table.tombstone(&RecordId::from("u1"));
        storage.commit(vec![("User".to_string(), table)]);

        assert_eq!(storage.reset_all(), vec!["User".to_string()]);
        assert_eq!(storage.snapshot().table_snapshot("User").unwrap().table.slot_count(), 0);
        assert!(storage.reset_all().is_empty());
    }
}
