//! Runtime values, record identifiers, and the flat per-model entity table.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Generic runtime value stored in entity records.
///
/// Supports all JSON-compatible types. Converts losslessly to and from
/// [`serde_json::Value`] except for non-finite floats, which become `Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// JSON array (ordered sequence of values).
    Array(Vec<Value>),
    /// JSON object. Uses `BTreeMap` for deterministic field order.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the inner map if this value is an object.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the inner slice if this value is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Identifier of a record within one model's table.
///
/// Ids arrive either as strings or integers. Equality, ordering, and hashing
/// all go through the canonical string form, so `Int(1)` and `Str("1")`
/// address the same record. The original form is kept for output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Integer id, e.g. `1`.
    Int(i64),
    /// String id, e.g. `"c1"`.
    Str(String),
}

impl RecordId {
    /// Extracts an id from a value. Only strings and integers qualify.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(RecordId::Int(*i)),
            Value::String(s) => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }

    /// Extracts an id from a JSON value. Only strings and integers qualify.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::String(s) => Some(RecordId::Str(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(RecordId::Int),
            _ => None,
        }
    }

    /// Converts back to a value, preserving the original form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(i) => Value::Int(*i),
            RecordId::Str(s) => Value::String(s.clone()),
        }
    }

    /// Canonical string form used for comparison.
    #[must_use]
    pub fn key(&self) -> Cow<'_, str> {
        match self {
            RecordId::Int(i) => Cow::Owned(i.to_string()),
            RecordId::Str(s) => Cow::Borrowed(s),
        }
    }
}

impl PartialEq for RecordId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RecordId::Int(a), RecordId::Int(b)) => a == b,
            (RecordId::Str(a), RecordId::Str(b)) => a == b,
            _ => self.key() == other.key(),
        }
    }
}

impl Eq for RecordId {}

impl Hash for RecordId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Str(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::Str(s)
    }
}

impl From<i64> for RecordId {
    fn from(i: i64) -> Self {
        RecordId::Int(i)
    }
}

/// A flat entity record: field name to value.
///
/// Relation fields hold a reference id, a list of reference ids, or `Null`.
pub type Record = BTreeMap<String, Value>;

/// Id-keyed table holding every record of one model.
///
/// Removed records may stay behind as tombstones (`None` slots) so the key
/// remains known; tombstones are invisible to [`EntityTable::get`] and
/// [`EntityTable::contains`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTable {
    slots: HashMap<RecordId, Option<Record>>,
}

impl EntityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live record for `id`, or `None` if absent or tombstoned.
    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.slots.get(id)?.as_ref()
    }

    /// Returns `true` if a live record exists for `id`.
    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.get(id).is_some()
    }

    /// Shallow-merges `record` over the existing record at `id`.
    ///
    /// Existing fields not present in `record` are kept; fields present in
    /// both are overwritten. A tombstoned slot merges as if empty.
    /// Returns `true` if the stored record changed.
    pub fn merge(&mut self, id: RecordId, record: Record) -> bool {
        match self.slots.get_mut(&id) {
            Some(Some(existing)) => {
                let mut changed = false;
                for (field, value) in record {
                    if existing.get(&field) != Some(&value) {
                        existing.insert(field, value);
                        changed = true;
                    }
                }
                changed
            }
            Some(slot) => {
                *slot = Some(record);
                true
            }
            None => {
                self.slots.insert(id, Some(record));
                true
            }
        }
    }

    /// Replaces a live record with a tombstone, keeping the key slot.
    /// Returns `true` if a live record was removed.
    pub fn tombstone(&mut self, id: &RecordId) -> bool {
        match self.slots.get_mut(id) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Removes a live record together with its key slot.
    /// Returns `true` if a live record was removed.
    pub fn delete(&mut self, id: &RecordId) -> bool {
        if self.contains(id) {
            self.slots.remove(id);
            true
        } else {
            false
        }
    }

    /// Drops every tombstone slot and returns the freed ids, sorted.
    pub fn prune_tombstones(&mut self) -> Vec<RecordId> {
        let mut pruned: Vec<RecordId> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &pruned {
            self.slots.remove(id);
        }
        pruned.sort();
        pruned
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.values().filter(|slot| slot.is_some()).count()
    }

    /// Returns `true` if there are no live records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of key slots, tombstones included.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Ids of all live records, sorted by canonical key.
    #[must_use]
    pub fn ids(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self.iter().map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids
    }

    /// Iterates over live records in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &Record)> {
        self.slots
            .iter()
            .filter_map(|(id, slot)| slot.as_ref().map(|record| (id, record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    // ---- RecordId ----

    #[test]
    fn int_and_string_ids_compare_equal() {
        assert_eq!(RecordId::Int(1), RecordId::from("1"));
        assert_ne!(RecordId::Int(1), RecordId::from("01"));
    }

    #[test]
    fn int_and_string_ids_share_a_table_slot() {
        let mut table = EntityTable::new();
        table.merge(RecordId::Int(7), record(&[("name", "seven".into())]));
        assert!(table.contains(&RecordId::from("7")));
        assert_eq!(table.slot_count(), 1);
    }

    #[test]
    fn id_from_value_rejects_non_scalar_ids() {
        assert_eq!(RecordId::from_value(&Value::Int(3)), Some(RecordId::Int(3)));
        assert!(RecordId::from_value(&Value::Null).is_none());
        assert!(RecordId::from_value(&Value::Bool(true)).is_none());
        assert!(RecordId::from_value(&Value::Float(1.5)).is_none());
        assert!(RecordId::from_value(&Value::Map(BTreeMap::new())).is_none());
    }

    #[test]
    fn id_to_value_preserves_form() {
        assert_eq!(RecordId::Int(2).to_value(), Value::Int(2));
        assert_eq!(RecordId::from("2").to_value(), Value::String("2".to_string()));
    }

    // ---- Value <-> JSON ----

    #[test]
    fn json_conversion_keeps_integers_and_floats_apart() {
        let value = Value::from(serde_json::json!({ "a": 1, "b": 1.5, "c": [true, null] }));
        let map = value.as_map().expect("object");
        assert_eq!(map["a"], Value::Int(1));
        assert_eq!(map["b"], Value::Float(1.5));
        assert_eq!(map["c"], Value::Array(vec![Value::Bool(true), Value::Null]));

        let back = serde_json::Value::from(value);
        assert_eq!(back, serde_json::json!({ "a": 1, "b": 1.5, "c": [true, null] }));
    }

    #[test]
    fn non_finite_float_becomes_null_json() {
        assert_eq!(
            serde_json::Value::from(Value::Float(f64::NAN)),
            serde_json::Value::Null
        );
    }

    // ---- EntityTable ----

    #[test]
    fn merge_keeps_existing_fields_and_overwrites_shared_ones() {
        let mut table = EntityTable::new();
        let id = RecordId::from("u1");
        table.merge(id.clone(), record(&[("name", "old".into()), ("age", Value::Int(1))]));
        table.merge(id.clone(), record(&[("name", "new".into())]));

        let stored = table.get(&id).expect("record exists");
        assert_eq!(stored["name"], Value::from("new"));
        assert_eq!(stored["age"], Value::Int(1));
    }

    #[test]
    fn merge_reports_unchanged_when_values_are_identical() {
        let mut table = EntityTable::new();
        let id = RecordId::from("u1");
        assert!(table.merge(id.clone(), record(&[("name", "a".into())])));
        assert!(!table.merge(id.clone(), record(&[("name", "a".into())])));
        assert!(!table.merge(id, Record::new()));
    }

    #[test]
    fn tombstone_hides_record_but_keeps_slot() {
        let mut table = EntityTable::new();
        let id = RecordId::from("u1");
        table.merge(id.clone(), record(&[("name", "a".into())]));

        assert!(table.tombstone(&id));
        assert!(table.get(&id).is_none());
        assert_eq!(table.len(), 0);
        assert_eq!(table.slot_count(), 1);

        // Second removal is a no-op.
        assert!(!table.tombstone(&id));
    }

    #[test]
    fn merge_onto_tombstone_starts_fresh() {
        let mut table = EntityTable::new();
        let id = RecordId::from("u1");
        table.merge(id.clone(), record(&[("name", "a".into()), ("age", Value::Int(3))]));
        table.tombstone(&id);
        table.merge(id.clone(), record(&[("name", "b".into())]));

        let stored = table.get(&id).expect("record revived");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored["name"], Value::from("b"));
    }

    #[test]
    fn delete_drops_slot() {
        let mut table = EntityTable::new();
        let id = RecordId::from("u1");
        table.merge(id.clone(), Record::new());
        assert!(table.delete(&id));
        assert_eq!(table.slot_count(), 0);
        assert!(!table.delete(&id));
    }

    #[test]
    fn prune_tombstones_returns_freed_ids() {
        let mut table = EntityTable::new();
        for name in ["b", "a", "c"] {
            table.merge(RecordId::from(name), Record::new());
        }
        table.tombstone(&RecordId::from("b"));
        table.tombstone(&RecordId::from("a"));

        let pruned = table.prune_tombstones();
        assert_eq!(pruned, vec![RecordId::from("a"), RecordId::from("b")]);
        assert_eq!(table.slot_count(), 1);
        assert_eq!(table.ids(), vec![RecordId::from("c")]);
    }
}
