//! Write payloads with an explicit split between nested data and references.
//!
//! A relation field in a [`Draft`] is either raw nested data that still has
//! to be normalized ([`FieldValue::Nested`], [`FieldValue::NestedList`]) or
//! an id that already points into the target table ([`FieldValue::Ref`],
//! [`FieldValue::RefList`], [`FieldValue::NullRef`]). The normalizer never
//! guesses from the shape of a value.
//!
//! [`Draft::from_json`] performs the classification for JSON payloads using
//! the schema, and rejects values that fit neither form.

use std::collections::BTreeMap;

use crate::error::{ModelError, Result};
use crate::registry::SchemaRegistry;
use crate::types::{RecordId, Value};

/// One field of a [`Draft`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain value stored as-is.
    Scalar(Value),
    /// A single nested record of the related model.
    Nested(Draft),
    /// An ordered list of nested records of the related model.
    NestedList(Vec<Draft>),
    /// Reference to an existing record of the related model.
    Ref(RecordId),
    /// Ordered references to existing records of the related model.
    RefList(Vec<RecordId>),
    /// Explicitly empty single reference.
    NullRef,
}

/// A complete or partial record on its way into the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    fields: BTreeMap<String, FieldValue>,
}

impl Draft {
    /// Creates an empty draft.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a plain field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .insert(name.into(), FieldValue::Scalar(value.into()));
        self
    }

    /// Sets a relation field to a nested record.
    #[must_use]
    pub fn nested(mut self, name: impl Into<String>, draft: Draft) -> Self {
        self.fields.insert(name.into(), FieldValue::Nested(draft));
        self
    }

    /// Sets a relation field to a list of nested records.
    #[must_use]
    pub fn nested_list(mut self, name: impl Into<String>, drafts: Vec<Draft>) -> Self {
        self.fields
            .insert(name.into(), FieldValue::NestedList(drafts));
        self
    }

    /// Sets a relation field to a reference id.
    #[must_use]
    pub fn reference(mut self, name: impl Into<String>, id: impl Into<RecordId>) -> Self {
        self.fields.insert(name.into(), FieldValue::Ref(id.into()));
        self
    }

    /// Sets a relation field to a list of reference ids.
    #[must_use]
    pub fn references(mut self, name: impl Into<String>, ids: Vec<RecordId>) -> Self {
        self.fields.insert(name.into(), FieldValue::RefList(ids));
        self
    }

    /// Sets a relation field to an explicit null reference.
    #[must_use]
    pub fn null_reference(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), FieldValue::NullRef);
        self
    }

    /// Returns the field value for `name`, if set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Reads the record id from `id_attr`, if present and id-like.
    #[must_use]
    pub fn id(&self, id_attr: &str) -> Option<RecordId> {
        match self.fields.get(id_attr)? {
            FieldValue::Scalar(value) => RecordId::from_value(value),
            FieldValue::Ref(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// Consumes the draft into its fields.
    pub(crate) fn into_fields(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }

    /// Decodes a JSON object into a draft of `model`.
    ///
    /// Non-relation fields become [`FieldValue::Scalar`]. Relation fields are
    /// classified by the rules in the module docs and nested objects are
    /// decoded against the related model.
    ///
    /// # Errors
    ///
    /// - [`ModelError::UnknownModel`] if `model` (or a related model holding
    ///   nested data) is not registered.
    /// - [`ModelError::InvalidPayload`] if `json` is not an object.
    /// - [`ModelError::InvalidRelation`] if a relation field holds a value that
    ///   is neither nested data nor ids.
    pub fn from_json(
        registry: &SchemaRegistry,
        model: &str,
        json: &serde_json::Value,
    ) -> Result<Self> {
        let definition = registry.get(model)?;
        let serde_json::Value::Object(object) = json else {
            return Err(ModelError::InvalidPayload {
                model: model.to_string(),
            });
        };

        let mut fields = BTreeMap::new();
        for (name, value) in object {
            let field = match definition.relation(name) {
                Some(target) => decode_relation(registry, model, name, target, value)?,
                None => FieldValue::Scalar(Value::from(value.clone())),
            };
            fields.insert(name.clone(), field);
        }
        Ok(Self { fields })
    }
}

fn decode_relation(
    registry: &SchemaRegistry,
    model: &str,
    field: &str,
    target: &str,
    json: &serde_json::Value,
) -> Result<FieldValue> {
    let invalid = || ModelError::InvalidRelation {
        model: model.to_string(),
        field: field.to_string(),
    };

    match json {
        serde_json::Value::Null => Ok(FieldValue::NullRef),
        serde_json::Value::Object(_) => Ok(FieldValue::Nested(Draft::from_json(
            registry, target, json,
        )?)),
        serde_json::Value::Array(items) if items.iter().all(serde_json::Value::is_object) => {
            // An empty array lands here too; it is an empty nested list, which
            // normalizes to the same empty id list as an empty `RefList`.
            let drafts = items
                .iter()
                .map(|item| Draft::from_json(registry, target, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(FieldValue::NestedList(drafts))
        }
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| RecordId::from_json(item).ok_or_else(invalid))
            .collect::<Result<Vec<_>>>()
            .map(FieldValue::RefList),
        other => RecordId::from_json(other)
            .map(FieldValue::Ref)
            .ok_or_else(invalid),
    }
}

/// The three shapes accepted by a write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteInput {
    /// A single record carrying its own id.
    One(Draft),
    /// A batch of records, each carrying its own id.
    Many(Vec<Draft>),
    /// A (possibly partial) record merged at an explicit id.
    At(RecordId, Draft),
}

impl WriteInput {
    /// Decodes a JSON payload: an object becomes [`WriteInput::One`], an array
    /// of objects becomes [`WriteInput::Many`].
    ///
    /// # Errors
    ///
    /// Same as [`Draft::from_json`]; any other top-level shape is
    /// [`ModelError::InvalidPayload`].
    pub fn from_json(
        registry: &SchemaRegistry,
        model: &str,
        json: &serde_json::Value,
    ) -> Result<Self> {
        match json {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| Draft::from_json(registry, model, item))
                .collect::<Result<Vec<_>>>()
                .map(WriteInput::Many),
            _ => Draft::from_json(registry, model, json).map(WriteInput::One),
        }
    }
}

impl From<Draft> for WriteInput {
    fn from(draft: Draft) -> Self {
        WriteInput::One(draft)
    }
}

impl From<Vec<Draft>> for WriteInput {
    fn from(drafts: Vec<Draft>) -> Self {
        WriteInput::Many(drafts)
    }
}

/// Ids produced by a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    /// Single-record write; `None` when the record was skipped.
    One(Option<RecordId>),
    /// Batch write; ids of the records that succeeded, in input order.
    Many(Vec<RecordId>),
}

impl Written {
    /// All written ids as a list.
    #[must_use]
    pub fn ids(&self) -> Vec<RecordId> {
        match self {
            Written::One(id) => id.iter().cloned().collect(),
            Written::Many(ids) => ids.clone(),
        }
    }
}
