//! Index definitions: which properties feed an index and how.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::model::PropertyType;

/// Whether an index includes entries whose key has null components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullPolicy {
    /// Keys containing any null component are never inserted; lookups for
    /// a null key always come back empty.
    IgnoreNulls,
    /// The null sentinel participates in ordering, range queries and
    /// uniqueness exactly like any value.
    IndexNulls,
}

/// How a collection-typed property feeds the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionIndexMode {
    /// No collection expansion; every indexed property must be scalar.
    None,
    /// One entry per map key.
    ByKey,
    /// One entry per list element, map value or bag RID.
    ByValue,
}

/// Declares which property path(s) feed an index, their declared types and
/// the index's null and collection semantics.
///
/// A definition is immutable once an index exists; redefining an index
/// means dropping and recreating it. A composite definition is an ordered
/// concatenation of single-property definitions, and two definitions are
/// considered equal when their paths, types and null policy coincide
/// (names are deliberately excluded so semantically identical indexes can
/// be deduplicated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    name: String,
    indexed_class: String,
    property_paths: Vec<String>,
    declared_types: Vec<PropertyType>,
    unique: bool,
    null_policy: NullPolicy,
    collection_mode: CollectionIndexMode,
}

impl IndexDefinition {
    pub fn new(
        name: impl Into<String>,
        indexed_class: impl Into<String>,
        property_paths: Vec<String>,
        declared_types: Vec<PropertyType>,
        unique: bool,
        null_policy: NullPolicy,
        collection_mode: CollectionIndexMode,
    ) -> Result<Self> {
        let name = name.into();
        let indexed_class = indexed_class.into();
        if property_paths.is_empty() {
            return Err(EngineError::SchemaInconsistency(format!(
                "index '{name}' declares no properties"
            )));
        }
        if property_paths.len() != declared_types.len() {
            return Err(EngineError::SchemaInconsistency(format!(
                "index '{name}' declares {} properties but {} types",
                property_paths.len(),
                declared_types.len()
            )));
        }
        let collection_components = declared_types
            .iter()
            .filter(|ty| ty.is_collection())
            .count();
        match collection_mode {
            CollectionIndexMode::None if collection_components > 0 => {
                // Embedded lists and maps without a collection mode cannot
                // be indexed; this is a configuration error reported before
                // any index is created.
                return Err(EngineError::UnsupportedKeyType(format!(
                    "index '{name}' declares a collection-typed property without a \
                     collection index mode"
                )));
            }
            CollectionIndexMode::ByKey | CollectionIndexMode::ByValue
                if collection_components != 1 =>
            {
                return Err(EngineError::SchemaInconsistency(format!(
                    "index '{name}' must declare exactly one collection-typed property \
                     for its collection mode, found {collection_components}"
                )));
            }
            _ => {}
        }
        Ok(Self {
            name,
            indexed_class,
            property_paths,
            declared_types,
            unique,
            null_policy,
            collection_mode,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indexed_class(&self) -> &str {
        &self.indexed_class
    }

    pub fn property_paths(&self) -> &[String] {
        &self.property_paths
    }

    pub fn declared_types(&self) -> &[PropertyType] {
        &self.declared_types
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn null_policy(&self) -> NullPolicy {
        self.null_policy
    }

    pub fn collection_mode(&self) -> CollectionIndexMode {
        self.collection_mode
    }

    pub fn is_composite(&self) -> bool {
        self.property_paths.len() > 1
    }

    /// Whether the supplied property list is a non-empty ordered prefix of
    /// the declared property paths, case-insensitively.
    ///
    /// This is the basis for "index involves these properties" queries
    /// issued by an external query planner.
    pub fn matches<S: AsRef<str>>(&self, properties: &[S]) -> bool {
        if properties.is_empty() || properties.len() > self.property_paths.len() {
            return false;
        }
        properties
            .iter()
            .zip(self.property_paths.iter())
            .all(|(asked, declared)| asked.as_ref().eq_ignore_ascii_case(declared))
    }
}

impl PartialEq for IndexDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.null_policy == other.null_policy
            && self.declared_types == other.declared_types
            && self.property_paths.len() == other.property_paths.len()
            && self
                .property_paths
                .iter()
                .zip(other.property_paths.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for IndexDefinition {}

impl Hash for IndexDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for path in &self.property_paths {
            path.to_ascii_lowercase().hash(state);
        }
        self.declared_types.hash(state);
        self.null_policy.hash(state);
    }
}

/// Catalog entry persisted alongside every index.
///
/// `ignore_null_values` must be explicit for composite definitions; for
/// implicit single-property indexes it defaults to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub ignore_null_values: bool,
    /// Extensible key/value metadata carried verbatim.
    pub extra: BTreeMap<String, String>,
}

impl IndexMetadata {
    pub fn new(ignore_null_values: bool) -> Self {
        Self {
            ignore_null_values,
            extra: BTreeMap::new(),
        }
    }
}

impl Default for IndexMetadata {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(paths: &[&str]) -> IndexDefinition {
        IndexDefinition::new(
            "test_idx",
            "Person",
            paths.iter().map(|p| p.to_string()).collect(),
            vec![PropertyType::String; paths.len()],
            false,
            NullPolicy::IgnoreNulls,
            CollectionIndexMode::None,
        )
        .unwrap()
    }

    #[test]
    fn matches_accepts_ordered_prefixes_only() {
        let def = definition(&["name", "surname", "age"]);
        assert!(def.matches(&["name"]));
        assert!(def.matches(&["name", "surname"]));
        assert!(def.matches(&["NAME", "Surname", "AGE"]));
        assert!(!def.matches(&["surname"]));
        assert!(!def.matches(&["name", "age"]));
        assert!(!def.matches(&["name", "surname", "age", "city"]));
        assert!(!def.matches::<&str>(&[]));
    }

    #[test]
    fn mismatched_paths_and_types_are_rejected() {
        let err = IndexDefinition::new(
            "bad",
            "Person",
            vec!["a".into(), "b".into()],
            vec![PropertyType::String],
            false,
            NullPolicy::IgnoreNulls,
            CollectionIndexMode::None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::SchemaInconsistency(_)));
    }

    #[test]
    fn collection_type_without_mode_is_rejected() {
        let err = IndexDefinition::new(
            "bad",
            "Person",
            vec!["tags".into()],
            vec![PropertyType::EmbeddedList],
            false,
            NullPolicy::IgnoreNulls,
            CollectionIndexMode::None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedKeyType(_)));
    }

    #[test]
    fn equality_is_structural_and_ignores_names() {
        let a = definition(&["name", "age"]);
        let b = IndexDefinition::new(
            "differently_named",
            "Person",
            vec!["NAME".into(), "AGE".into()],
            vec![PropertyType::String, PropertyType::String],
            true,
            NullPolicy::IgnoreNulls,
            CollectionIndexMode::None,
        )
        .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, definition(&["name"]));
    }
}
