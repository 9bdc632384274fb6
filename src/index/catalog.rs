//! Registry of named indexes and the minimal class metadata they rely on.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::db::store::RecordStore;
use crate::error::{EngineError, Result};
use crate::index::definition::{IndexDefinition, IndexMetadata, NullPolicy};
use crate::index::index::Index;
use crate::key::codec;

/// Callback surface for long-running index builds.
///
/// `on_progress` may return `false` to cancel the build; a cancelled build
/// leaves no index behind.
pub trait ProgressListener {
    fn on_begin(&self, _index: &str, _total: u64) {}
    fn on_progress(&self, _index: &str, _done: u64) -> bool {
        true
    }
    fn on_completion(&self, _index: &str, _success: bool) {}
}

/// Listener that ignores every callback.
pub struct NoProgress;

impl ProgressListener for NoProgress {}

/// Declared metadata for one document class.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub name: String,
    pub superclass: Option<String>,
    /// Declared property names, lowercased for case-insensitive lookup.
    properties: Vec<String>,
}

impl ClassDescriptor {
    pub fn new(
        name: impl Into<String>,
        superclass: Option<String>,
        properties: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            superclass,
            properties: properties
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        }
    }

    fn declares(&self, property: &str) -> bool {
        let lowered = property.to_ascii_lowercase();
        self.properties.iter().any(|p| *p == lowered)
    }
}

/// Registry of named indexes per class.
///
/// Names are case-insensitive. The catalog owns create/drop/rebuild and
/// resolves "does this property list have a covering index" queries;
/// it never mutates index contents outside those operations.
pub struct IndexCatalog {
    indexes: DashMap<String, Arc<Index>>,
    classes: DashMap<String, ClassDescriptor>,
}

impl Default for IndexCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexCatalog {
    pub fn new() -> Self {
        Self {
            indexes: DashMap::new(),
            classes: DashMap::new(),
        }
    }

    /// Declares a class so indexes can be created against it.
    pub fn register_class(&self, descriptor: ClassDescriptor) {
        self.classes
            .insert(descriptor.name.to_ascii_lowercase(), descriptor);
    }

    pub fn class(&self, name: &str) -> Option<ClassDescriptor> {
        self.classes
            .get(&name.to_ascii_lowercase())
            .map(|entry| entry.value().clone())
    }

    /// Whether `class` equals `ancestor` or inherits from it, walking the
    /// superclass chain. Comparison is case-insensitive.
    pub fn is_same_or_subclass(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class.to_ascii_lowercase());
        let ancestor = ancestor.to_ascii_lowercase();
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self
                .classes
                .get(&name)
                .and_then(|entry| entry.superclass.as_ref().map(|s| s.to_ascii_lowercase()));
        }
        false
    }

    fn validate_definition(&self, definition: &IndexDefinition) -> Result<()> {
        let class_key = definition.indexed_class().to_ascii_lowercase();
        let Some(class) = self.classes.get(&class_key) else {
            return Err(EngineError::SchemaInconsistency(format!(
                "class '{}' referenced by index '{}' is not declared",
                definition.indexed_class(),
                definition.name()
            )));
        };
        for path in definition.property_paths() {
            let mut declared = class.declares(path);
            // Walk superclasses; a property may be declared higher up.
            let mut ancestor = class.superclass.clone();
            while !declared {
                let Some(name) = ancestor else { break };
                let Some(parent) = self.classes.get(&name.to_ascii_lowercase()) else {
                    break;
                };
                declared = parent.declares(path);
                ancestor = parent.superclass.clone();
            }
            if !declared {
                return Err(EngineError::SchemaInconsistency(format!(
                    "property '{}' referenced by index '{}' is not declared on class '{}'",
                    path,
                    definition.name(),
                    definition.indexed_class()
                )));
            }
        }
        Ok(())
    }

    fn resolve_metadata(
        definition: &IndexDefinition,
        metadata: Option<IndexMetadata>,
    ) -> Result<IndexMetadata> {
        let resolved = match metadata {
            Some(metadata) => metadata,
            None if definition.is_composite() => {
                return Err(EngineError::SchemaInconsistency(format!(
                    "composite index '{}' requires explicit ignoreNullValues metadata",
                    definition.name()
                )));
            }
            // Implicit single-property indexes default to ignoring nulls.
            None => IndexMetadata::default(),
        };
        let ignores = definition.null_policy() == NullPolicy::IgnoreNulls;
        if resolved.ignore_null_values != ignores {
            return Err(EngineError::SchemaInconsistency(format!(
                "index '{}' metadata ignoreNullValues={} contradicts its null policy",
                definition.name(),
                resolved.ignore_null_values
            )));
        }
        Ok(resolved)
    }

    /// Creates and registers a new index, backfilling it from the records
    /// already stored in `target_collections`.
    ///
    /// Fails with [`EngineError::IndexAlreadyExists`] on a name collision
    /// and [`EngineError::SchemaInconsistency`] when the referenced class
    /// or a property path is undeclared. A uniqueness violation or an
    /// uncanonicalizable value encountered during backfill fails creation
    /// and leaves no index behind.
    pub fn create_index(
        &self,
        definition: IndexDefinition,
        metadata: Option<IndexMetadata>,
        target_collections: Vec<i32>,
        listener: &dyn ProgressListener,
        store: &RecordStore,
    ) -> Result<Arc<Index>> {
        let name_key = definition.name().to_ascii_lowercase();
        if self.indexes.contains_key(&name_key) {
            return Err(EngineError::IndexAlreadyExists(
                definition.name().to_string(),
            ));
        }
        self.validate_definition(&definition)?;
        let metadata = Self::resolve_metadata(&definition, metadata)?;

        let name = definition.name().to_string();
        let index = Arc::new(Index::new(definition, metadata, target_collections.clone()));

        let total: u64 = target_collections
            .iter()
            .map(|cid| store.collection_len(*cid) as u64)
            .sum();
        listener.on_begin(&name, total);
        if let Err(err) = self.backfill(&index, &target_collections, listener, store) {
            listener.on_completion(&name, false);
            warn!(index = %name, error = %err, "Index build failed");
            return Err(err);
        }
        listener.on_completion(&name, true);

        self.indexes.insert(name_key, Arc::clone(&index));
        info!(index = %name, entries = index.size(), "Index created");
        Ok(index)
    }

    fn backfill(
        &self,
        index: &Arc<Index>,
        target_collections: &[i32],
        listener: &dyn ProgressListener,
        store: &RecordStore,
    ) -> Result<()> {
        let mut done = 0u64;
        for collection_id in target_collections {
            for (rid, document) in store.scan_collection(*collection_id) {
                if self.is_same_or_subclass(&document.class_name, index.definition().indexed_class())
                {
                    for (key, rid) in codec::entries_for_document(index.definition(), &document, rid)?
                    {
                        index.put(key, rid)?;
                    }
                }
                done += 1;
                if !listener.on_progress(index.name(), done) {
                    return Err(EngineError::InvalidArgument(format!(
                        "build of index '{}' was cancelled",
                        index.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Clears and re-backfills an existing index from its target
    /// collections. Returns the number of resulting associations.
    pub fn rebuild_index(
        &self,
        name: &str,
        listener: &dyn ProgressListener,
        store: &RecordStore,
    ) -> Result<usize> {
        let index = self.get_index(name).ok_or(EngineError::NotFound("index"))?;
        index.clear();
        let targets = index.target_collections().to_vec();
        listener.on_begin(index.name(), targets.iter().map(|c| store.collection_len(*c) as u64).sum());
        match self.backfill(&index, &targets, listener, store) {
            Ok(()) => {
                listener.on_completion(index.name(), true);
                info!(index = %index.name(), entries = index.size(), "Index rebuilt");
                Ok(index.size())
            }
            Err(err) => {
                // A failed rebuild leaves the index registered but empty;
                // the caller decides whether to drop or retry.
                index.clear();
                listener.on_completion(index.name(), false);
                Err(err)
            }
        }
    }

    /// Removes all entries and unregisters the index.
    ///
    /// Dropping a non-existent index is a no-op, not an error; this
    /// mirrors an intentionally permissive historical contract.
    pub fn drop_index(&self, name: &str) {
        if let Some((_, index)) = self.indexes.remove(&name.to_ascii_lowercase()) {
            index.clear();
            debug!(index = name, "Index dropped");
        }
    }

    pub fn get_index(&self, name: &str) -> Option<Arc<Index>> {
        self.indexes
            .get(&name.to_ascii_lowercase())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Every index applicable to `class`, including indexes declared on
    /// any of its superclasses (inheritance is flattened at lookup time).
    pub fn get_class_indexes(&self, class: &str) -> Vec<Arc<Index>> {
        let mut results: Vec<Arc<Index>> = self
            .indexes
            .iter()
            .filter(|entry| self.is_same_or_subclass(class, entry.definition().indexed_class()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        results.sort_by(|a, b| a.name().cmp(b.name()));
        results
    }

    /// Every index whose definition matches `properties` as an ordered
    /// prefix, case-insensitively on class and property names.
    pub fn get_involved_indexes<S: AsRef<str>>(
        &self,
        class: &str,
        properties: &[S],
    ) -> Vec<Arc<Index>> {
        self.get_class_indexes(class)
            .into_iter()
            .filter(|index| index.definition().matches(properties))
            .collect()
    }

    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .indexes
            .iter()
            .map(|entry| entry.name().to_string())
            .collect();
        names.sort();
        names
    }
}

/// Convenience: registers the classes referenced by tests and callers that
/// do not track schema metadata themselves.
pub fn class_with_properties(
    name: &str,
    superclass: Option<&str>,
    properties: &[&str],
) -> ClassDescriptor {
    ClassDescriptor::new(
        name,
        superclass.map(str::to_string),
        properties.iter().map(|p| p.to_string()).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::definition::CollectionIndexMode;
    use crate::model::PropertyType;

    fn catalog() -> IndexCatalog {
        let catalog = IndexCatalog::new();
        catalog.register_class(class_with_properties("Person", None, &["name", "age"]));
        catalog.register_class(class_with_properties(
            "Employee",
            Some("Person"),
            &["salary"],
        ));
        catalog
    }

    fn definition(name: &str, class: &str, paths: &[&str]) -> IndexDefinition {
        IndexDefinition::new(
            name,
            class,
            paths.iter().map(|p| p.to_string()).collect(),
            vec![PropertyType::String; paths.len()],
            false,
            NullPolicy::IgnoreNulls,
            CollectionIndexMode::None,
        )
        .unwrap()
    }

    #[test]
    fn create_rejects_duplicate_names_case_insensitively() {
        let catalog = catalog();
        let store = RecordStore::new();
        catalog
            .create_index(
                definition("Person.name", "Person", &["name"]),
                None,
                vec![1],
                &NoProgress,
                &store,
            )
            .unwrap();
        let err = catalog
            .create_index(
                definition("PERSON.NAME", "Person", &["name"]),
                None,
                vec![1],
                &NoProgress,
                &store,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::IndexAlreadyExists(_)));
    }

    #[test]
    fn create_rejects_undeclared_class_and_property() {
        let catalog = catalog();
        let store = RecordStore::new();
        let err = catalog
            .create_index(
                definition("Ghost.name", "Ghost", &["name"]),
                None,
                vec![1],
                &NoProgress,
                &store,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::SchemaInconsistency(_)));

        let err = catalog
            .create_index(
                definition("Person.ghost", "Person", &["ghost"]),
                None,
                vec![1],
                &NoProgress,
                &store,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::SchemaInconsistency(_)));
    }

    #[test]
    fn composite_requires_explicit_null_metadata() {
        let catalog = catalog();
        let store = RecordStore::new();
        let err = catalog
            .create_index(
                definition("Person.name_age", "Person", &["name", "age"]),
                None,
                vec![1],
                &NoProgress,
                &store,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::SchemaInconsistency(_)));

        catalog
            .create_index(
                definition("Person.name_age", "Person", &["name", "age"]),
                Some(IndexMetadata::new(true)),
                vec![1],
                &NoProgress,
                &store,
            )
            .unwrap();
    }

    #[test]
    fn drop_of_missing_index_is_a_noop() {
        let catalog = catalog();
        catalog.drop_index("never.created");
        assert!(catalog.index_names().is_empty());
    }

    #[test]
    fn involved_indexes_follow_prefix_and_inheritance() {
        let catalog = catalog();
        let store = RecordStore::new();
        catalog
            .create_index(
                definition("Person.name_age", "Person", &["name", "age"]),
                Some(IndexMetadata::new(true)),
                vec![1],
                &NoProgress,
                &store,
            )
            .unwrap();
        catalog
            .create_index(
                definition("Employee.salary", "Employee", &["salary"]),
                None,
                vec![2],
                &NoProgress,
                &store,
            )
            .unwrap();

        // Prefix match against the declaring class.
        assert_eq!(catalog.get_involved_indexes("person", &["NAME"]).len(), 1);
        assert_eq!(
            catalog
                .get_involved_indexes("Person", &["name", "age"])
                .len(),
            1
        );
        assert!(catalog.get_involved_indexes("Person", &["age"]).is_empty());

        // Employee inherits Person's indexes; Person does not see
        // Employee's.
        assert_eq!(catalog.get_class_indexes("Employee").len(), 2);
        assert_eq!(catalog.get_class_indexes("Person").len(), 1);
    }
}
