//! All-or-nothing write transactions over a snapshot.
//!
//! A [`Transaction`] copies the tables a write may touch out of a base
//! snapshot into a private [`TableSet`]. Nothing is visible to readers until
//! [`Transaction::commit`], which publishes only the tables that actually
//! differ from the base. Dropping a transaction discards it.

use std::sync::Arc;

use entitygraph_core::TableSet;

use super::engine::StorageEngine;
use super::snapshot::StoreSnapshot;

/// Outcome of a commit that changed at least one table.
#[derive(Debug, Clone)]
pub struct Committed {
    /// Snapshot published by the commit.
    pub snapshot: Arc<StoreSnapshot>,
    /// Models whose tables were replaced, sorted.
    pub models: Vec<String>,
}

/// A private working copy of some tables of one snapshot.
pub struct Transaction {
    base: Arc<StoreSnapshot>,
    tables: TableSet,
}

impl Transaction {
    /// Starts a transaction over `models` of `base`.
    ///
    /// Models without a table in `base` are left out of the working set, so
    /// writing to them fails with an unknown-model error.
    #[must_use]
    pub fn begin(base: Arc<StoreSnapshot>, models: &[String]) -> Self {
        let mut tables = TableSet::new();
        for (name, table) in base.copy_tables(models) {
            tables.insert(name, table);
        }
        Self { base, tables }
    }

    /// The snapshot this transaction started from.
    #[must_use]
    pub fn base(&self) -> &StoreSnapshot {
        &self.base
    }

    /// The working tables.
    #[must_use]
    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    /// Mutable access to the working tables.
    pub fn tables_mut(&mut self) -> &mut TableSet {
        &mut self.tables
    }

    /// Publishes every working table that differs from the base snapshot.
    ///
    /// Returns `None`, publishing nothing, when no table changed.
    pub fn commit(self, engine: &dyn StorageEngine) -> Option<Committed> {
        let base = self.base;
        let changed: Vec<_> = self
            .tables
            .into_dirty_tables()
            .into_iter()
            .filter(|(name, table)| {
                base.table_snapshot(name)
                    .is_none_or(|snapshot| snapshot.table != *table)
            })
            .collect();
        if changed.is_empty() {
            return None;
        }
        let models = changed.iter().map(|(name, _)| name.clone()).collect();
        let snapshot = engine.commit(changed);
        Some(Committed { snapshot, models })
    }
}
