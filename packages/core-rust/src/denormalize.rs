//! Rebuilds shallow or deep views of records from flat tables.
//!
//! Both views apply the dangling-reference rule to every relation field: ids
//! in a list that no longer resolve are dropped, and a single id that no
//! longer resolves becomes `Null`. Missing records are never an error.

use tracing::warn;

use crate::error::{ModelError, Result};
use crate::registry::SchemaRegistry;
use crate::traits::TableSource;
use crate::types::{EntityTable, Record, RecordId, Value};

/// How far relation fields are resolved on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Relation fields stay ids / id lists (filtered for dangling ids).
    Shallow,
    /// Relation fields are replaced by the hydrated related records.
    Deep,
}

/// Which ids a read asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdSelector {
    /// A single id; the result is a record or `None`.
    One(RecordId),
    /// A list of ids; the result omits ids that do not resolve.
    Many(Vec<RecordId>),
}

impl IdSelector {
    /// Decodes a JSON id or id list.
    ///
    /// Returns `None` for `null` and for values that are not ids. Non-id
    /// entries inside a list are skipped.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Array(items) => Some(IdSelector::Many(
                items.iter().filter_map(RecordId::from_json).collect(),
            )),
            other => RecordId::from_json(other).map(IdSelector::One),
        }
    }
}

impl From<RecordId> for IdSelector {
    fn from(id: RecordId) -> Self {
        IdSelector::One(id)
    }
}

impl From<&str> for IdSelector {
    fn from(id: &str) -> Self {
        IdSelector::One(id.into())
    }
}

impl From<i64> for IdSelector {
    fn from(id: i64) -> Self {
        IdSelector::One(id.into())
    }
}

impl From<Vec<RecordId>> for IdSelector {
    fn from(ids: Vec<RecordId>) -> Self {
        IdSelector::Many(ids)
    }
}

/// Result of a read, shaped after the [`IdSelector`] that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    /// Single-id read.
    One(Option<Record>),
    /// Multi-id read, in request order, unresolved ids omitted.
    Many(Vec<Record>),
}

impl ReadResult {
    /// Returns the single record, if this is a resolved single-id read.
    #[must_use]
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            ReadResult::One(record) => record.as_ref(),
            ReadResult::Many(_) => None,
        }
    }

    /// Returns the records of a multi-id read (empty for single-id reads).
    #[must_use]
    pub fn as_many(&self) -> &[Record] {
        match self {
            ReadResult::Many(records) => records,
            ReadResult::One(_) => &[],
        }
    }

    /// Renders the result as JSON: `null`, an object, or an array of objects.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let record_json =
            |record: &Record| serde_json::Value::from(Value::Map(record.clone()));
        match self {
            ReadResult::One(None) => serde_json::Value::Null,
            ReadResult::One(Some(record)) => record_json(record),
            ReadResult::Many(records) => {
                serde_json::Value::Array(records.iter().map(record_json).collect())
            }
        }
    }
}

/// Reads records out of a [`TableSource`] using the registry's schemas.
pub struct Denormalizer<'a, S: TableSource + ?Sized> {
    registry: &'a SchemaRegistry,
    source: &'a S,
}

impl<'a, S: TableSource + ?Sized> Denormalizer<'a, S> {
    /// Creates a denormalizer reading from `source`.
    pub fn new(registry: &'a SchemaRegistry, source: &'a S) -> Self {
        Self { registry, source }
    }

    /// Reads in the given mode.
    ///
    /// # Errors
    ///
    /// See [`Denormalizer::read_shallow`] and [`Denormalizer::read_deep`].
    pub fn read(&self, model: &str, ids: &IdSelector, mode: ReadMode) -> Result<ReadResult> {
        match mode {
            ReadMode::Shallow => self.read_shallow(model, ids),
            ReadMode::Deep => self.read_deep(model, ids),
        }
    }

    /// Reads records with relation fields left as filtered ids.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `model`, or the target of a
    /// relation field present on a returned record, is not registered.
    pub fn read_shallow(&self, model: &str, ids: &IdSelector) -> Result<ReadResult> {
        self.collect(model, ids, |record| self.shallow_record(model, record))
    }

    /// Reads records with relation fields recursively hydrated.
    ///
    /// # Errors
    ///
    /// - [`ModelError::UnknownModel`] as for [`Denormalizer::read_shallow`].
    /// - [`ModelError::CyclicSchema`] if `model` or any model in its closure
    ///   can reach itself, since the hydration would not terminate.
    pub fn read_deep(&self, model: &str, ids: &IdSelector) -> Result<ReadResult> {
        self.ensure_bounded(model)?;
        self.collect(model, ids, |record| self.deep_record(model, record))
    }

    fn collect<F>(&self, model: &str, ids: &IdSelector, mut view: F) -> Result<ReadResult>
    where
        F: FnMut(&Record) -> Result<Record>,
    {
        let table = self.table(model)?;
        match ids {
            IdSelector::One(id) => table.get(id).map(&mut view).transpose().map(ReadResult::One),
            IdSelector::Many(ids) => ids
                .iter()
                .filter_map(|id| table.get(id))
                .map(view)
                .collect::<Result<Vec<_>>>()
                .map(ReadResult::Many),
        }
    }

    fn table(&self, model: &str) -> Result<&'a EntityTable> {
        self.registry.get(model)?;
        self.source
            .table(model)
            .ok_or_else(|| ModelError::UnknownModel {
                name: model.to_string(),
            })
    }

    fn ensure_bounded(&self, model: &str) -> Result<()> {
        let mut members = vec![model.to_string()];
        members.extend_from_slice(self.registry.dependency_closure(model)?);
        for member in members {
            // Unregistered targets have no relations of their own.
            if self.registry.contains(&member) && self.registry.is_cyclic(&member)? {
                warn!(model = %model, cyclic = %member, "refusing unbounded deep read");
                return Err(ModelError::CyclicSchema { model: member });
            }
        }
        Ok(())
    }

    fn shallow_record(&self, model: &str, record: &Record) -> Result<Record> {
        let definition = self.registry.get(model)?;
        let mut view = record.clone();
        for (field, target) in &definition.fields {
            if let Some(value) = view.get_mut(field) {
                let target_table = self.table(target)?;
                *value = filter_reference(value, target_table);
            }
        }
        Ok(view)
    }

    fn deep_record(&self, model: &str, record: &Record) -> Result<Record> {
        let definition = self.registry.get(model)?;
        let mut view = record.clone();
        for (field, target) in &definition.fields {
            if let Some(value) = view.get_mut(field) {
                let target_table = self.table(target)?;
                *value = self.resolve_reference(value, target, target_table)?;
            }
        }
        Ok(view)
    }

    fn resolve_reference(&self, value: &Value, target: &str, table: &EntityTable) -> Result<Value> {
        match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| RecordId::from_value(item).and_then(|id| table.get(&id)))
                .map(|record| self.deep_record(target, record).map(Value::Map))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => match RecordId::from_value(other).and_then(|id| table.get(&id)) {
                Some(record) => self.deep_record(target, record).map(Value::Map),
                None => Ok(Value::Null),
            },
        }
    }
}

/// Applies the dangling-reference rule to a stored relation value.
fn filter_reference(value: &Value, table: &EntityTable) -> Value {
    let resolves = |item: &Value| RecordId::from_value(item).is_some_and(|id| table.contains(&id));
    match value {
        Value::Array(items) => {
            Value::Array(items.iter().filter(|item| resolves(item)).cloned().collect())
        }
        other if resolves(other) => other.clone(),
        _ => Value::Null,
    }
}
