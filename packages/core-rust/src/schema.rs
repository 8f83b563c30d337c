use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Definition of one model: its name, id attribute, and relation fields.
///
/// Deserializes from the startup configuration format
/// `{ "name": "Book", "idAttr": "id", "fields": { "author": "User" } }`,
/// where `fields` is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    /// Unique model name, e.g. `"Book"`.
    pub name: String,
    /// Attribute holding each record's id, e.g. `"id"`.
    pub id_attr: String,
    /// Relation fields: field name to the name of the referenced model.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl ModelDefinition {
    /// Creates a definition with no relation fields.
    #[must_use]
    pub fn new(name: impl Into<String>, id_attr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_attr: id_attr.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Declares `field` as a reference to `model`.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, model: impl Into<String>) -> Self {
        self.fields.insert(field.into(), model.into());
        self
    }

    /// Returns the referenced model name if `field` is a relation.
    #[must_use]
    pub fn relation(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Models referenced directly by this definition, without duplicates.
    #[must_use]
    pub fn direct_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = Vec::with_capacity(self.fields.len());
        for target in self.fields.values() {
            if !targets.contains(target) {
                targets.push(target.clone());
            }
        }
        targets
    }
}

/// Parses a JSON array of model definitions.
///
/// # Errors
///
/// Returns [`ModelError::InvalidSchema`](crate::ModelError::InvalidSchema)
/// if the input is not a valid list of definitions.
pub fn parse_definitions(json: &str) -> Result<Vec<ModelDefinition>> {
    Ok(serde_json::from_str(json)?)
}
