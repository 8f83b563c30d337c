use std::collections::HashMap;

use crate::tables::TableSet;
use crate::types::EntityTable;

/// Read access to entity tables by model name.
///
/// Implemented by store snapshots so the denormalizer can hydrate records
/// from one consistent point-in-time view. Returns `None` for models with no
/// table.
pub trait TableSource {
    /// Returns the table holding `model`'s records.
    fn table(&self, model: &str) -> Option<&EntityTable>;
}

impl TableSource for HashMap<String, EntityTable> {
    fn table(&self, model: &str) -> Option<&EntityTable> {
        self.get(model)
    }
}

impl TableSource for TableSet {
    fn table(&self, model: &str) -> Option<&EntityTable> {
        TableSet::table(self, model).ok()
    }
}
