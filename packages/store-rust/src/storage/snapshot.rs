//! Immutable point-in-time views of the store's tables.
//!
//! A [`StoreSnapshot`] maps each model name to an `Arc<TableSnapshot>`.
//! Commits build a new snapshot that shares every untouched table with the
//! previous one, so a table's `Arc` identity and version only change when
//! its contents do.

use std::collections::HashMap;
use std::sync::Arc;

use entitygraph_core::{EntityTable, TableSource};

/// One model's table together with the version it was committed at.
///
/// Versions come from a store-wide counter and are never reused, so two
/// snapshots of the same model with equal versions hold equal tables.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    /// Commit version of this table contents.
    pub version: u64,
    /// The table itself.
    pub table: EntityTable,
}

impl TableSnapshot {
    /// Wraps `table` at `version`.
    #[must_use]
    pub fn new(version: u64, table: EntityTable) -> Self {
        Self { version, table }
    }
}

/// A consistent view of every table in the store.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    epoch: u64,
    tables: HashMap<String, Arc<TableSnapshot>>,
}

impl StoreSnapshot {
    /// Creates a snapshot with no tables at epoch 0.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of commits applied to reach this snapshot.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the versioned table of `model`.
    #[must_use]
    pub fn table_snapshot(&self, model: &str) -> Option<&Arc<TableSnapshot>> {
        self.tables.get(model)
    }

    /// Returns the commit version of `model`'s table.
    #[must_use]
    pub fn version_of(&self, model: &str) -> Option<u64> {
        self.tables.get(model).map(|snapshot| snapshot.version)
    }

    /// Returns `true` if `model` has a table.
    #[must_use]
    pub fn contains(&self, model: &str) -> bool {
        self.tables.contains_key(model)
    }

    /// Model names with a table, sorted.
    #[must_use]
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns a copy of the working tables for `models`.
    ///
    /// Models without a table are skipped.
    #[must_use]
    pub fn copy_tables(&self, models: &[String]) -> Vec<(String, EntityTable)> {
        models
            .iter()
            .filter_map(|name| {
                self.tables
                    .get(name)
                    .map(|snapshot| (name.clone(), snapshot.table.clone()))
            })
            .collect()
    }

    /// Iterates over all versioned tables.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<TableSnapshot>)> {
        self.tables.iter()
    }

    /// Returns the next snapshot with `tables` replaced and the epoch bumped.
    ///
    /// Tables not named in `tables` keep their `Arc`.
    #[must_use]
    pub fn with_tables<I>(&self, tables: I) -> Self
    where
        I: IntoIterator<Item = (String, Arc<TableSnapshot>)>,
    {
        let mut next = self.clone();
        next.epoch += 1;
        next.tables.extend(tables);
        next
    }
}

impl TableSource for StoreSnapshot {
    fn table(&self, model: &str) -> Option<&EntityTable> {
        self.tables.get(model).map(|snapshot| &snapshot.table)
    }
}
