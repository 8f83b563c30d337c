//! Private working copy of several entity tables used during one write.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ModelError, Result};
use crate::types::EntityTable;

/// A set of tables copied out of a snapshot, with per-table change tracking.
///
/// A write only ever touches the tables placed here; reaching for a model
/// that was not copied in is reported as [`ModelError::UnknownModel`].
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: BTreeMap<String, EntityTable>,
    dirty: BTreeSet<String>,
}

impl TableSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table under `model`, replacing any previous copy.
    pub fn insert(&mut self, model: impl Into<String>, table: EntityTable) {
        self.tables.insert(model.into(), table);
    }

    /// Returns the working table of `model`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `model` is not in the set.
    pub fn table(&self, model: &str) -> Result<&EntityTable> {
        self.tables
            .get(model)
            .ok_or_else(|| ModelError::unknown_model(model))
    }

    /// Applies `mutate` to the table of `model` and marks it dirty when the
    /// closure reports a change.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `model` is not in the set.
    pub fn update<F>(&mut self, model: &str, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut EntityTable) -> bool,
    {
        let table = self
            .tables
            .get_mut(model)
            .ok_or_else(|| ModelError::unknown_model(model))?;
        let changed = mutate(table);
        if changed {
            self.dirty.insert(model.to_string());
        }
        Ok(changed)
    }

    /// Returns `true` if any table changed.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Names of changed tables, sorted.
    #[must_use]
    pub fn dirty_models(&self) -> Vec<String> {
        self.dirty.iter().cloned().collect()
    }

    /// Consumes the set, yielding only the changed tables.
    #[must_use]
    pub fn into_dirty_tables(mut self) -> Vec<(String, EntityTable)> {
        self.dirty
            .iter()
            .filter_map(|name| self.tables.remove_entry(name))
            .collect()
    }
}
