//! Schema registry: model definitions and their dependency graph.
//!
//! The registry is an explicit value owned by the application (typically via
//! `ModelStore`). Definitions are immutable once registered. Every
//! registration recomputes the full dependency map; registries are small and
//! fixed per application, so the quadratic recompute is not a concern.

use std::collections::{HashMap, VecDeque};

use crate::denormalize::ReadMode;
use crate::error::{ModelError, Result};
use crate::schema::ModelDefinition;

/// Holds every registered [`ModelDefinition`] and the derived
/// direct/transitive dependency lists.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    definitions: HashMap<String, ModelDefinition>,
    /// Registration order, for deterministic iteration.
    order: Vec<String>,
    /// Model name -> transitive dependency closure (BFS discovery order).
    closures: HashMap<String, Vec<String>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition and recomputes the dependency map.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateModel`] if the name is already taken.
    pub fn register(&mut self, definition: ModelDefinition) -> Result<()> {
        if self.definitions.contains_key(&definition.name) {
            return Err(ModelError::DuplicateModel {
                name: definition.name,
            });
        }
        self.order.push(definition.name.clone());
        self.definitions.insert(definition.name.clone(), definition);
        self.recompute_closures();
        Ok(())
    }

    /// Returns the definition of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `name` is not registered.
    pub fn get(&self, name: &str) -> Result<&ModelDefinition> {
        self.definitions
            .get(name)
            .ok_or_else(|| ModelError::unknown_model(name))
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Registered model names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Models referenced directly by `name`'s relation fields.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `name` is not registered.
    pub fn direct_dependencies(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.get(name)?.direct_targets())
    }

    /// Models reachable from `name` through relation fields, direct and
    /// indirect, in breadth-first discovery order without duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `name` is not registered.
    pub fn dependency_closure(&self, name: &str) -> Result<&[String]> {
        self.closures
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ModelError::unknown_model(name))
    }

    /// Returns `true` if `name` can reach itself through its relations.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `name` is not registered.
    pub fn is_cyclic(&self, name: &str) -> Result<bool> {
        Ok(self.dependency_closure(name)?.iter().any(|dep| dep == name))
    }

    /// Tables whose contents can affect a read (or write) of `name`: the
    /// model itself followed by its direct dependencies for shallow reads,
    /// or its full closure for deep reads and writes.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownModel`] if `name` is not registered.
    pub fn relevant_models(&self, name: &str, mode: ReadMode) -> Result<Vec<String>> {
        let deps = match mode {
            ReadMode::Shallow => self.direct_dependencies(name)?,
            ReadMode::Deep => self.dependency_closure(name)?.to_vec(),
        };
        let mut models = Vec::with_capacity(deps.len() + 1);
        models.push(name.to_string());
        models.extend(deps.into_iter().filter(|dep| dep != name));
        Ok(models)
    }

    fn recompute_closures(&mut self) {
        let direct: HashMap<&str, Vec<String>> = self
            .definitions
            .iter()
            .map(|(name, def)| (name.as_str(), def.direct_targets()))
            .collect();

        let mut closures = HashMap::with_capacity(direct.len());
        for name in &self.order {
            let mut closure = direct[name.as_str()].clone();
            let mut queue: VecDeque<String> = closure.iter().cloned().collect();
            while let Some(current) = queue.pop_front() {
                // Unregistered targets contribute nothing further.
                let Some(deps) = direct.get(current.as_str()) else {
                    continue;
                };
                for dep in deps {
                    if !closure.contains(dep) {
                        closure.push(dep.clone());
                        queue.push_back(dep.clone());
                    }
                }
            }
            closures.insert(name.clone(), closure);
        }
        self.closures = closures;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn library() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                ModelDefinition::new("Book", "id")
                    .with_field("author", "User")
                    .with_field("comments", "Comment"),
            )
            .unwrap();
        registry
            .register(ModelDefinition::new("User", "userId"))
            .unwrap();
        registry
            .register(
                ModelDefinition::new("Comment", "cid")
                    .with_field("user", "User")
                    .with_field("tags", "Tag"),
            )
            .unwrap();
        registry.register(ModelDefinition::new("Tag", "tid")).unwrap();
        registry
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = library();
        let err = registry
            .register(ModelDefinition::new("User", "id"))
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateModel { name } if name == "User"));
        // The original definition is untouched.
        assert_eq!(registry.get("User").unwrap().id_attr, "userId");
    }

    #[test]
    fn unknown_model_lookup_fails() {
        let registry = library();
        assert!(matches!(
            registry.get("Shelf"),
            Err(ModelError::UnknownModel { .. })
        ));
        assert!(matches!(
            registry.dependency_closure("Shelf"),
            Err(ModelError::UnknownModel { .. })
        ));
    }

    #[test]
    fn closure_expands_breadth_first() {
        let registry = library();
        // Book's direct targets come first (field-name order), then Comment's.
        assert_eq!(
            registry.dependency_closure("Book").unwrap(),
            ["User".to_string(), "Comment".to_string(), "Tag".to_string()]
        );
        assert_eq!(
            registry.dependency_closure("Comment").unwrap(),
            ["Tag".to_string(), "User".to_string()]
        );
        assert!(registry.dependency_closure("Tag").unwrap().is_empty());
    }

    #[test]
    fn direct_dependencies_are_one_level() {
        let registry = library();
        assert_eq!(
            registry.direct_dependencies("Book").unwrap(),
            vec!["User".to_string(), "Comment".to_string()]
        );
    }

    #[test]
    fn closure_is_recomputed_when_targets_register_later() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(ModelDefinition::new("A", "id").with_field("b", "B"))
            .unwrap();
        assert_eq!(registry.dependency_closure("A").unwrap(), ["B".to_string()]);

        registry
            .register(ModelDefinition::new("B", "id").with_field("c", "C"))
            .unwrap();
        assert_eq!(
            registry.dependency_closure("A").unwrap(),
            ["B".to_string(), "C".to_string()]
        );
    }

    #[test]
    fn self_reference_is_cyclic() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(ModelDefinition::new("Node", "id").with_field("parent", "Node"))
            .unwrap();
        assert!(registry.is_cyclic("Node").unwrap());
        assert_eq!(registry.dependency_closure("Node").unwrap(), ["Node".to_string()]);
    }

    #[test]
    fn mutual_reference_is_cyclic_for_both() {
        let mut registry = SchemaRegistry::new();
        registry
            .register(ModelDefinition::new("A", "id").with_field("b", "B"))
            .unwrap();
        registry
            .register(ModelDefinition::new("B", "id").with_field("a", "A"))
            .unwrap();
        assert!(registry.is_cyclic("A").unwrap());
        assert!(registry.is_cyclic("B").unwrap());
    }

    #[test]
    fn library_schema_is_acyclic() {
        let registry = library();
        for name in registry.names() {
            assert!(!registry.is_cyclic(name).unwrap(), "{name} should be acyclic");
        }
    }

    #[test]
    fn relevant_models_put_the_model_first() {
        let registry = library();
        assert_eq!(
            registry.relevant_models("Book", ReadMode::Shallow).unwrap(),
            vec!["Book".to_string(), "User".to_string(), "Comment".to_string()]
        );
        assert_eq!(
            registry.relevant_models("Book", ReadMode::Deep).unwrap(),
            vec![
                "Book".to_string(),
                "User".to_string(),
                "Comment".to_string(),
                "Tag".to_string()
            ]
        );
        assert_eq!(
            registry.relevant_models("Tag", ReadMode::Deep).unwrap(),
            vec!["Tag".to_string()]
        );
    }

    // ---- Property tests ----

    /// Builds a registry of `n` models named `M0..Mn` where model `i` references
    /// every model `j` listed in `edges[i]`.
    fn registry_from_edges(edges: &[Vec<usize>]) -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        for (i, targets) in edges.iter().enumerate() {
            let mut def = ModelDefinition::new(format!("M{i}"), "id");
            for (k, j) in targets.iter().enumerate() {
                def = def.with_field(format!("f{k}"), format!("M{j}"));
            }
            registry.register(def).unwrap();
        }
        registry
    }

    /// Reference closure computed by naive fixpoint iteration.
    fn naive_closure(edges: &[Vec<usize>], start: usize) -> Vec<usize> {
        let mut reached: Vec<usize> = edges[start].clone();
        loop {
            let before = reached.len();
            let snapshot = reached.clone();
            for node in snapshot {
                for &next in &edges[node] {
                    if !reached.contains(&next) {
                        reached.push(next);
                    }
                }
            }
            if reached.len() == before {
                break;
            }
        }
        reached.sort_unstable();
        reached.dedup();
        reached
    }

    fn edges_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
        (1usize..8).prop_flat_map(|n| prop::collection::vec(prop::collection::vec(0..n, 0..4), n))
    }

    proptest! {
        #[test]
        fn closure_matches_naive_fixpoint(edges in edges_strategy()) {
            let registry = registry_from_edges(&edges);
            for i in 0..edges.len() {
                let closure = registry.dependency_closure(&format!("M{i}")).unwrap();

                let mut unique = closure.to_vec();
                unique.sort();
                unique.dedup();
                prop_assert_eq!(unique.len(), closure.len(), "closure has duplicates");

                let mut expected: Vec<String> = naive_closure(&edges, i)
                    .into_iter()
                    .map(|j| format!("M{j}"))
                    .collect();
                expected.sort();
                prop_assert_eq!(unique, expected);
            }
        }
    }
}
