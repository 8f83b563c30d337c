//! The public model store.
//!
//! [`ModelStore`] ties the schema registry, the versioned table storage, the
//! memoized query cache and change observers together. Mutations are
//! serialized by one writer lock and applied through a [`Transaction`];
//! reads load the current registry and snapshot without locking.

use std::sync::Arc;

use arc_swap::ArcSwap;
use entitygraph_core::{
    Denormalizer, Draft, IdSelector, ModelDefinition, ModelError, Normalizer, ReadMode,
    ReadResult, RecordId, Result, SchemaRegistry, WriteInput, Written,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{RemovalMode, StoreConfig};
use crate::query::{CacheStats, Dependencies, QueryCache, QueryKey};
use crate::storage::{
    ChangeObserver, Committed, CompositeChangeObserver, ObserverId, StorageEngine,
    StoreSnapshot, SwapStorage, TableSnapshot, Transaction,
};

/// A normalized entity store over a registry of model schemas.
pub struct ModelStore {
    registry: ArcSwap<SchemaRegistry>,
    engine: Arc<dyn StorageEngine>,
    writer: Mutex<()>,
    cache: QueryCache,
    observers: CompositeChangeObserver,
    config: StoreConfig,
}

impl ModelStore {
    /// Creates an empty store backed by [`SwapStorage`].
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self::with_engine(config, Arc::new(SwapStorage::new()))
    }

    /// Creates an empty store over `engine`.
    ///
    /// The engine should hold no tables yet; tables are created as models
    /// are registered.
    #[must_use]
    pub fn with_engine(config: StoreConfig, engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            registry: ArcSwap::from_pointee(SchemaRegistry::new()),
            engine,
            writer: Mutex::new(()),
            cache: QueryCache::new(config.memo_capacity),
            observers: CompositeChangeObserver::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Schema
    // -----------------------------------------------------------------------

    /// Registers one model and creates its empty table.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateModel`] if the name is taken.
    pub fn register(&self, definition: ModelDefinition) -> Result<()> {
        self.register_all([definition])
    }

    /// Registers several models as one unit: either all of them are added or,
    /// on the first duplicate, none are.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateModel`] if any name is taken, including
    /// by an earlier definition in the same batch.
    pub fn register_all<I>(&self, definitions: I) -> Result<()>
    where
        I: IntoIterator<Item = ModelDefinition>,
    {
        let _writer = self.writer.lock();
        let mut registry = SchemaRegistry::clone(&self.registry.load());
        let mut names = Vec::new();
        for definition in definitions {
            names.push(definition.name.clone());
            registry.register(definition)?;
        }
        // Tables exist before the registry that names them is visible.
        for name in &names {
            self.engine.create_table(name);
        }
        self.registry.store(Arc::new(registry));
        info!(models = ?names, "registered models");
        Ok(())
    }

    /// Models reachable from `model` through relations, breadth-first.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `model` is not registered.
    pub fn dependency_closure(&self, model: &str) -> Result<Vec<String>> {
        self.registry
            .load()
            .dependency_closure(model)
            .map(<[String]>::to_vec)
    }

    /// Models referenced directly by `model`'s relation fields.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `model` is not registered.
    pub fn direct_dependencies(&self, model: &str) -> Result<Vec<String>> {
        self.registry.load().direct_dependencies(model)
    }

    /// Returns a handle bound to `model`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `model` is not registered.
    pub fn model(&self, model: &str) -> Result<ModelHandle<'_>> {
        self.registry.load().get(model)?;
        Ok(ModelHandle {
            store: self,
            name: model.to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Normalizes `input` into `model`'s table and the tables of every model
    /// it nests, committing all of them in one atomic step.
    ///
    /// Records without an id are skipped. Nothing is committed, and nobody is
    /// notified, when the write leaves every table unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`], [`ModelError::UndeclaredRelation`]
    /// or [`ModelError::InvalidRelation`]; the store is left untouched.
    pub fn write(&self, model: &str, input: impl Into<WriteInput>) -> Result<Written> {
        let input = input.into();
        let (written, committed) = {
            let _writer = self.writer.lock();
            let registry = self.registry.load_full();
            let models = registry.relevant_models(model, ReadMode::Deep)?;
            let mut txn = Transaction::begin(self.engine.snapshot(), &models);
            let written = Normalizer::new(&registry, txn.tables_mut()).write(model, input)?;
            (written, txn.commit(self.engine.as_ref()))
        };

        match committed {
            Some(Committed { snapshot, models }) => {
                debug!(model = %model, tables = ?models, epoch = snapshot.epoch(), "write committed");
                self.observers.on_write(model, &written.ids(), &models);
            }
            None => debug!(model = %model, "write left tables unchanged"),
        }
        Ok(written)
    }

    /// Decodes a JSON object or list of objects for `model` and writes it.
    ///
    /// # Errors
    ///
    /// As [`ModelStore::write`], plus the decoding errors of
    /// [`WriteInput::from_json`].
    pub fn write_json(&self, model: &str, json: &serde_json::Value) -> Result<Written> {
        let input = WriteInput::from_json(&self.registry.load(), model, json)?;
        self.write(model, input)
    }

    /// Removes the records selected by `target` from `model`'s table.
    ///
    /// Only `model`'s table changes; records elsewhere that reference the
    /// removed ids are left alone and read back without them. Ids that are
    /// absent or already removed are ignored.
    ///
    /// # Errors
    ///
    /// - [`ModelError::InvalidRemoveTarget`] if `target` is `None`.
    /// - [`ModelError::UnknownModel`] if `model` is not registered.
    pub fn remove(&self, model: &str, target: Option<IdSelector>) -> Result<()> {
        let Some(target) = target else {
            return Err(ModelError::InvalidRemoveTarget {
                model: model.to_string(),
            });
        };
        let ids = match target {
            IdSelector::One(id) => vec![id],
            IdSelector::Many(ids) => ids,
        };
        let mode = self.config.removal;

        let mut removed = Vec::new();
        let committed = {
            let _writer = self.writer.lock();
            self.registry.load().get(model)?;
            let mut txn = Transaction::begin(self.engine.snapshot(), &[model.to_string()]);
            txn.tables_mut().update(model, |table| {
                for id in ids {
                    let changed = match mode {
                        RemovalMode::Tombstone => table.tombstone(&id),
                        RemovalMode::Delete => table.delete(&id),
                    };
                    if changed {
                        removed.push(id);
                    }
                }
                !removed.is_empty()
            })?;
            txn.commit(self.engine.as_ref())
        };

        if let Some(Committed { snapshot, .. }) = committed {
            debug!(model = %model, ids = ?removed, epoch = snapshot.epoch(), "remove committed");
            self.observers.on_remove(model, &removed);
        }
        Ok(())
    }

    /// Removes the records selected by a JSON id or id list. `null` and
    /// non-id values count as an undefined target.
    ///
    /// # Errors
    ///
    /// As [`ModelStore::remove`].
    pub fn remove_json(&self, model: &str, json: &serde_json::Value) -> Result<()> {
        self.remove(model, IdSelector::from_json(json))
    }

    /// Drops the tombstoned slots of `model`'s table and returns their ids.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `model` is not registered.
    pub fn prune_tombstones(&self, model: &str) -> Result<Vec<RecordId>> {
        let mut pruned = Vec::new();
        let committed = {
            let _writer = self.writer.lock();
            self.registry.load().get(model)?;
            let mut txn = Transaction::begin(self.engine.snapshot(), &[model.to_string()]);
            txn.tables_mut().update(model, |table| {
                pruned = table.prune_tombstones();
                !pruned.is_empty()
            })?;
            txn.commit(self.engine.as_ref())
        };

        if committed.is_some() {
            debug!(model = %model, count = pruned.len(), "pruned tombstones");
            self.observers.on_prune(model, &pruned);
        }
        Ok(pruned)
    }

    /// Empties every table in one atomic step. Registrations are kept.
    ///
    /// Subscribers are notified once, and only if some table held slots.
    pub fn reset_all(&self) {
        let cleared = {
            let _writer = self.writer.lock();
            self.engine.reset_all()
        };
        if cleared.is_empty() {
            debug!("reset found every table empty");
            return;
        }
        info!(tables = ?cleared, "reset all tables");
        self.observers.on_reset(&cleared);
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Reads records with relation fields as filtered ids.
    ///
    /// Repeating a read while none of the tables it depends on changed
    /// returns the same `Arc`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `model` is not registered.
    pub fn read_shallow(&self, model: &str, ids: impl Into<IdSelector>) -> Result<Arc<ReadResult>> {
        self.read(model, ids, ReadMode::Shallow)
    }

    /// Reads records with relation fields hydrated recursively.
    ///
    /// # Errors
    ///
    /// - [`ModelError::UnknownModel`] if `model` is not registered.
    /// - [`ModelError::CyclicSchema`] if the hydration would not terminate.
    pub fn read_deep(&self, model: &str, ids: impl Into<IdSelector>) -> Result<Arc<ReadResult>> {
        self.read(model, ids, ReadMode::Deep)
    }

    /// Reads in the given mode through the memo cache.
    ///
    /// # Errors
    ///
    /// See [`ModelStore::read_shallow`] and [`ModelStore::read_deep`].
    pub fn read(
        &self,
        model: &str,
        ids: impl Into<IdSelector>,
        mode: ReadMode,
    ) -> Result<Arc<ReadResult>> {
        let ids = ids.into();
        // Registry first: every model it names already has a table.
        let registry = self.registry.load_full();
        let snapshot = self.engine.snapshot();

        let dependencies: Dependencies = registry
            .relevant_models(model, mode)?
            .into_iter()
            .map(|name| {
                let version = snapshot.version_of(&name);
                (name, version)
            })
            .collect();
        let key = QueryKey::new(model, mode, ids);

        self.cache.get_or_compute(key.clone(), dependencies, || {
            Denormalizer::new(&registry, snapshot.as_ref()).read(model, &key.ids, mode)
        })
    }

    /// Current point-in-time view of every table.
    #[must_use]
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.engine.snapshot()
    }

    /// Current versioned table of `model`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `model` is not registered.
    pub fn table(&self, model: &str) -> Result<Arc<TableSnapshot>> {
        self.registry.load().get(model)?;
        self.engine
            .snapshot()
            .table_snapshot(model)
            .cloned()
            .ok_or_else(|| ModelError::UnknownModel {
                name: model.to_string(),
            })
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    /// Subscribes `observer` to committed changes.
    pub fn subscribe(&self, observer: Arc<dyn ChangeObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    /// Unsubscribes the observer behind `id`. Returns `false` if unknown.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

// ---------------------------------------------------------------------------
// ModelHandle
// ---------------------------------------------------------------------------

/// A view of a [`ModelStore`] bound to one registered model.
#[derive(Clone)]
pub struct ModelHandle<'a> {
    store: &'a ModelStore,
    name: String,
}

impl ModelHandle<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    ///
    /// As [`ModelStore::write`].
    pub fn write(&self, input: impl Into<WriteInput>) -> Result<Written> {
        self.store.write(&self.name, input)
    }

    /// # Errors
    ///
    /// As [`ModelStore::write_json`].
    pub fn write_json(&self, json: &serde_json::Value) -> Result<Written> {
        self.store.write_json(&self.name, json)
    }

    /// Merges `draft` into the record stored under `id`, creating it if
    /// needed. The id attribute is not added to the record.
    ///
    /// # Errors
    ///
    /// As [`ModelStore::write`].
    pub fn write_at(&self, id: impl Into<RecordId>, draft: Draft) -> Result<Written> {
        self.store
            .write(&self.name, WriteInput::At(id.into(), draft))
    }

    /// # Errors
    ///
    /// As [`ModelStore::remove`].
    pub fn remove(&self, target: impl Into<IdSelector>) -> Result<()> {
        self.store.remove(&self.name, Some(target.into()))
    }

    /// # Errors
    ///
    /// As [`ModelStore::remove_json`].
    pub fn remove_json(&self, json: &serde_json::Value) -> Result<()> {
        self.store.remove_json(&self.name, json)
    }

    /// # Errors
    ///
    /// As [`ModelStore::read_shallow`].
    pub fn read_shallow(&self, ids: impl Into<IdSelector>) -> Result<Arc<ReadResult>> {
        self.store.read_shallow(&self.name, ids)
    }

    /// # Errors
    ///
    /// As [`ModelStore::read_deep`].
    pub fn read_deep(&self, ids: impl Into<IdSelector>) -> Result<Arc<ReadResult>> {
        self.store.read_deep(&self.name, ids)
    }

    /// # Errors
    ///
    /// As [`ModelStore::table`].
    pub fn table(&self) -> Result<Arc<TableSnapshot>> {
        self.store.table(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use entitygraph_core::Value;
    use serde_json::json;

    use super::*;

    fn library() -> ModelStore {
        let store = ModelStore::default();
        store
            .register_all([
                ModelDefinition::new("Book", "id")
                    .with_field("author", "User")
                    .with_field("comments", "Comment"),
                ModelDefinition::new("User", "userId"),
                ModelDefinition::new("Comment", "cid")
                    .with_field("user", "User")
                    .with_field("tags", "Tag"),
                ModelDefinition::new("Tag", "tid"),
            ])
            .unwrap();
        store
    }

    #[derive(Default)]
    struct CountingObserver {
        writes: AtomicUsize,
        removes: AtomicUsize,
        resets: AtomicUsize,
    }

    impl ChangeObserver for CountingObserver {
        fn on_write(&self, _: &str, _: &[RecordId], _: &[String]) {
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        fn on_remove(&self, _: &str, _: &[RecordId]) {
            self.removes.fetch_add(1, Ordering::Relaxed);
        }
        fn on_prune(&self, _: &str, _: &[RecordId]) {}
        fn on_reset(&self, _: &[String]) {
            self.resets.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ---- Registration ----

    #[test]
    fn register_creates_empty_tables() {
        let store = library();
        assert!(store.table("Tag").unwrap().table.is_empty());
        assert_eq!(
            store.dependency_closure("Book").unwrap(),
            vec!["User".to_string(), "Comment".to_string(), "Tag".to_string()]
        );
        assert_eq!(
            store.direct_dependencies("Comment").unwrap(),
            vec!["Tag".to_string(), "User".to_string()]
        );
    }

    #[test]
    fn register_all_is_all_or_nothing() {
        let store = library();
        let err = store
            .register_all([
                ModelDefinition::new("Shelf", "id"),
                ModelDefinition::new("Tag", "tid"),
            ])
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateModel { name } if name == "Tag"));
        assert!(matches!(store.model("Shelf"), Err(ModelError::UnknownModel { .. })));
    }

    #[test]
    fn unknown_model_is_rejected_everywhere() {
        let store = library();
        assert!(matches!(
            store.write_json("Shelf", &json!({ "id": 1 })),
            Err(ModelError::UnknownModel { .. })
        ));
        assert!(matches!(
            store.read_shallow("Shelf", 1_i64),
            Err(ModelError::UnknownModel { .. })
        ));
        assert!(matches!(
            store.remove("Shelf", Some(1_i64.into())),
            Err(ModelError::UnknownModel { .. })
        ));
        assert!(matches!(store.table("Shelf"), Err(ModelError::UnknownModel { .. })));
    }

    // ---- Writes ----

    #[test]
    fn failed_write_leaves_store_untouched() {
        let store = library();
        let before = store.snapshot();
        let draft = Draft::new()
            .field("userId", "1")
            .nested("friend", Draft::new().field("userId", "2"));
        assert!(store.write("User", draft).is_err());
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[test]
    fn plain_map_in_relation_field_fails_without_writing() {
        let store = library();
        let before = store.snapshot();
        let draft = Draft::new()
            .field("id", 1_i64)
            .field("author", Value::from(json!({ "userId": "u9", "name": "Nine" })));

        let err = store.write("Book", draft).unwrap_err();

        assert!(matches!(err, ModelError::InvalidRelation { field, .. } if field == "author"));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        assert!(store.table("User").unwrap().table.is_empty());
    }

    #[test]
    fn identical_write_does_not_notify() {
        let store = library();
        let observer = Arc::new(CountingObserver::default());
        store.subscribe(observer.clone());

        let payload = json!({ "userId": "1", "name": "user1" });
        store.write_json("User", &payload).unwrap();
        let epoch = store.snapshot().epoch();
        store.write_json("User", &payload).unwrap();

        assert_eq!(observer.writes.load(Ordering::Relaxed), 1);
        assert_eq!(store.snapshot().epoch(), epoch);
    }

    #[test]
    fn write_json_rejects_scalar_payload() {
        let store = library();
        assert!(matches!(
            store.write_json("User", &json!(42)),
            Err(ModelError::InvalidPayload { .. })
        ));
    }

    // ---- Removal ----

    #[test]
    fn remove_requires_a_target() {
        let store = library();
        assert!(matches!(
            store.remove("User", None),
            Err(ModelError::InvalidRemoveTarget { model }) if model == "User"
        ));
        assert!(matches!(
            store.remove_json("User", &serde_json::Value::Null),
            Err(ModelError::InvalidRemoveTarget { .. })
        ));
    }

    #[test]
    fn removing_absent_ids_is_a_no_op() {
        let store = library();
        let observer = Arc::new(CountingObserver::default());
        store.subscribe(observer.clone());
        let before = store.snapshot();

        store.remove("User", Some("nobody".into())).unwrap();

        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        assert_eq!(observer.removes.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn tombstones_can_be_pruned() {
        let store = library();
        store
            .write_json("User", &json!([{ "userId": "1" }, { "userId": "2" }]))
            .unwrap();
        store.remove_json("User", &json!(["1"])).unwrap();

        let table = store.table("User").unwrap();
        assert_eq!(table.table.len(), 1);
        assert_eq!(table.table.slot_count(), 2);

        assert_eq!(store.prune_tombstones("User").unwrap(), vec![RecordId::from("1")]);
        assert_eq!(store.table("User").unwrap().table.slot_count(), 1);
        assert!(store.prune_tombstones("User").unwrap().is_empty());
    }

    #[test]
    fn delete_mode_drops_slots() {
        let store = ModelStore::new(StoreConfig {
            removal: RemovalMode::Delete,
            ..StoreConfig::default()
        });
        store.register(ModelDefinition::new("User", "userId")).unwrap();
        store.write_json("User", &json!({ "userId": "1" })).unwrap();
        store.remove("User", Some("1".into())).unwrap();
        assert_eq!(store.table("User").unwrap().table.slot_count(), 0);
    }

    // ---- Reads ----

    #[test]
    fn numeric_and_string_ids_address_the_same_record() {
        let store = library();
        store.write_json("Book", &json!({ "id": 1, "name": "book1" })).unwrap();
        let by_int = store.read_shallow("Book", 1_i64).unwrap();
        let by_str = store.read_shallow("Book", "1").unwrap();
        assert_eq!(by_int, by_str);
        assert_eq!(by_int.as_one().unwrap()["id"], Value::Int(1));
    }

    #[test]
    fn repeated_read_returns_same_arc() {
        let store = library();
        store.write_json("Tag", &json!({ "tid": "t01" })).unwrap();
        let first = store.read_deep("Tag", "t01").unwrap();
        let second = store.read_deep("Tag", "t01").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.cache_stats().hits, 1);
    }

    #[test]
    fn cyclic_schema_deep_read_fails_but_shallow_works() {
        let store = ModelStore::default();
        store
            .register(ModelDefinition::new("Node", "id").with_field("next", "Node"))
            .unwrap();
        store
            .write_json("Node", &json!({ "id": 1, "next": { "id": 2 } }))
            .unwrap();

        assert!(matches!(
            store.read_deep("Node", 1_i64),
            Err(ModelError::CyclicSchema { .. })
        ));
        let shallow = store.read_shallow("Node", 1_i64).unwrap();
        assert_eq!(shallow.as_one().unwrap()["next"], Value::Int(2));
    }

    // ---- Reset ----

    #[test]
    fn reset_notifies_once_and_only_when_needed() {
        let store = library();
        let observer = Arc::new(CountingObserver::default());
        let id = store.subscribe(observer.clone());

        store.reset_all();
        assert_eq!(observer.resets.load(Ordering::Relaxed), 0);

        store.write_json("Tag", &json!({ "tid": "t01" })).unwrap();
        store.write_json("User", &json!({ "userId": "u1" })).unwrap();
        store.reset_all();
        assert_eq!(observer.resets.load(Ordering::Relaxed), 1);
        assert!(store.table("Tag").unwrap().table.is_empty());
        assert!(store.model("Tag").is_ok());

        assert!(store.unsubscribe(id));
        store.write_json("Tag", &json!({ "tid": "t02" })).unwrap();
        assert_eq!(observer.writes.load(Ordering::Relaxed), 2);
    }

    // ---- Handle ----

    #[test]
    fn handle_forwards_to_store() {
        let store = library();
        let users = store.model("User").unwrap();
        assert_eq!(users.name(), "User");

        users.write_json(&json!({ "userId": "1", "name": "user1" })).unwrap();
        users
            .write_at("1", Draft::new().field("name", "renamed"))
            .unwrap();
        let user = users.read_shallow("1").unwrap();
        assert_eq!(user.as_one().unwrap()["name"], Value::from("renamed"));

        users.remove("1").unwrap();
        assert!(users.read_deep("1").unwrap().as_one().is_none());
        assert_eq!(users.table().unwrap().table.slot_count(), 1);
    }
}
