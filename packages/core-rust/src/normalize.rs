//! Flattens nested entity drafts into per-model tables.
//!
//! Each record is split at its relation fields: nested data is normalized
//! into the related model's table first and replaced by the resulting id or
//! id list, then the flattened record is shallow-merged into its own table.

use tracing::warn;

use crate::draft::{Draft, FieldValue, WriteInput, Written};
use crate::error::{ModelError, Result};
use crate::registry::SchemaRegistry;
use crate::tables::TableSet;
use crate::types::{Record, RecordId, Value};

/// Writes drafts into a [`TableSet`] according to the registry's schemas.
///
/// The table set must hold a copy of every table the write can reach, i.e.
/// the model itself and its dependency closure.
pub struct Normalizer<'a> {
    registry: &'a SchemaRegistry,
    tables: &'a mut TableSet,
}

impl<'a> Normalizer<'a> {
    /// Creates a normalizer writing into `tables`.
    pub fn new(registry: &'a SchemaRegistry, tables: &'a mut TableSet) -> Self {
        Self { registry, tables }
    }

    /// Writes `input` into `model`'s table, recursing through relations.
    ///
    /// Records without an id are skipped with a warning and omitted from the
    /// result; batch results keep input order.
    ///
    /// # Errors
    ///
    /// - [`ModelError::UnknownModel`] if `model` or a related model that
    ///   receives nested data is unknown.
    /// - [`ModelError::UndeclaredRelation`] if nested data or references
    ///   appear in a field that is not a declared relation.
    /// - [`ModelError::InvalidRelation`] if a relation field is given a plain
    ///   value that is not an id, an id list, or null.
    ///
    /// On error the table set may be partially updated and must be discarded.
    pub fn write(&mut self, model: &str, input: WriteInput) -> Result<Written> {
        match input {
            WriteInput::One(draft) => self.normalize_item(model, draft, None).map(Written::One),
            WriteInput::Many(drafts) => self.normalize_list(model, drafts).map(Written::Many),
            WriteInput::At(id, draft) => self
                .normalize_item(model, draft, Some(id))
                .map(Written::One),
        }
    }

    fn normalize_list(&mut self, model: &str, drafts: Vec<Draft>) -> Result<Vec<RecordId>> {
        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            if let Some(id) = self.normalize_item(model, draft, None)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn normalize_item(
        &mut self,
        model: &str,
        draft: Draft,
        explicit_id: Option<RecordId>,
    ) -> Result<Option<RecordId>> {
        let registry = self.registry;
        let definition = registry.get(model)?;
        let Some(id) = explicit_id.or_else(|| draft.id(&definition.id_attr)) else {
            let err = ModelError::MissingId {
                model: model.to_string(),
                id_attr: definition.id_attr.clone(),
            };
            warn!(model = %model, error = %err, "skipping record without id");
            return Ok(None);
        };

        let mut record = Record::new();
        for (field, value) in draft.into_fields() {
            match (&value, definition.relation(&field)) {
                (FieldValue::Scalar(scalar), Some(_)) if !holds_ids(scalar) => {
                    return Err(ModelError::InvalidRelation {
                        model: model.to_string(),
                        field,
                    });
                }
                (FieldValue::Ref(_) | FieldValue::RefList(_) | FieldValue::NullRef, None) => {
                    return Err(ModelError::UndeclaredRelation {
                        model: model.to_string(),
                        field,
                    });
                }
                _ => {}
            }
            let stored = match value {
                FieldValue::Scalar(value) => value,
                FieldValue::Ref(id) => id.to_value(),
                FieldValue::RefList(ids) => {
                    Value::Array(ids.iter().map(RecordId::to_value).collect())
                }
                FieldValue::NullRef => Value::Null,
                FieldValue::Nested(nested) => {
                    let target = self.relation_target(model, &field)?;
                    self.normalize_item(&target, nested, None)?
                        .map_or(Value::Null, |id| id.to_value())
                }
                FieldValue::NestedList(nested) => {
                    let target = self.relation_target(model, &field)?;
                    let ids = self.normalize_list(&target, nested)?;
                    Value::Array(ids.iter().map(RecordId::to_value).collect())
                }
            };
            record.insert(field, stored);
        }

        let merged_id = id.clone();
        self.tables
            .update(model, move |table| table.merge(merged_id, record))?;
        Ok(Some(id))
    }

    fn relation_target(&self, model: &str, field: &str) -> Result<String> {
        self.registry
            .get(model)?
            .relation(field)
            .map(str::to_string)
            .ok_or_else(|| ModelError::UndeclaredRelation {
                model: model.to_string(),
                field: field.to_string(),
            })
    }
}

/// Plain values a relation field may hold: null, an id, or a list of ids.
fn holds_ids(value: &Value) -> bool {
    value.is_null()
        || RecordId::from_value(value).is_some()
        || value
            .as_array()
            .is_some_and(|items| items.iter().all(|item| RecordId::from_value(item).is_some()))
}
