//! The core ordered key-to-RID index structure.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use parking_lot::RwLock;

use crate::error::{EngineError, Result};
use crate::index::definition::{IndexDefinition, IndexMetadata, NullPolicy};
use crate::key::CompositeKey;
use crate::model::Rid;

/// Committed entries, keyed and ordered by canonical composite key.
///
/// A UNIQUE index holds at most one live RID per key; a second insert
/// under the same key is a conflict, never an overwrite.
#[derive(Debug)]
enum IndexEntries {
    Unique(BTreeMap<CompositeKey, Rid>),
    NotUnique(BTreeMap<CompositeKey, BTreeSet<Rid>>),
}

/// An ordered map from canonical keys to record identifiers.
///
/// The committed structure is mutated only while a transaction's change
/// log is replayed at commit; reads outside a transaction observe
/// committed state only. Entries live behind a `parking_lot::RwLock` so
/// concurrent committed reads never block each other.
///
/// Replay takes the write lock per mutation, not for the whole commit, so
/// a reader racing an in-flight commit may transiently observe entries of
/// a commit that subsequently fails and undoes itself. A reader that needs
/// a stable committed view must serialize with commits, for example by
/// holding the store's commit lock across its scan.
#[derive(Debug)]
pub struct Index {
    definition: IndexDefinition,
    metadata: IndexMetadata,
    target_collections: Vec<i32>,
    entries: RwLock<IndexEntries>,
}

impl Index {
    pub(crate) fn new(
        definition: IndexDefinition,
        metadata: IndexMetadata,
        target_collections: Vec<i32>,
    ) -> Self {
        let entries = if definition.is_unique() {
            IndexEntries::Unique(BTreeMap::new())
        } else {
            IndexEntries::NotUnique(BTreeMap::new())
        };
        Self {
            definition,
            metadata,
            target_collections,
            entries: RwLock::new(entries),
        }
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub(crate) fn target_collections(&self) -> &[i32] {
        &self.target_collections
    }

    pub fn is_unique(&self) -> bool {
        self.definition.is_unique()
    }

    /// Whether a key is excluded by the index's null policy.
    pub fn ignores(&self, key: &CompositeKey) -> bool {
        self.definition.null_policy() == NullPolicy::IgnoreNulls && key.has_null()
    }

    /// All RIDs committed under `key`.
    pub fn get(&self, key: &CompositeKey) -> Vec<Rid> {
        if self.ignores(key) {
            return Vec::new();
        }
        match &*self.entries.read() {
            IndexEntries::Unique(map) => map.get(key).map(|rid| vec![*rid]).unwrap_or_default(),
            IndexEntries::NotUnique(map) => map
                .get(key)
                .map(|rids| rids.iter().copied().collect())
                .unwrap_or_default(),
        }
    }

    /// The single RID committed under `key`, for UNIQUE indexes.
    pub fn get_unique(&self, key: &CompositeKey) -> Option<Rid> {
        self.get(key).into_iter().next()
    }

    /// Adds one key-to-RID association.
    ///
    /// Returns `Ok(true)` when the committed structure changed, `Ok(false)`
    /// for no-ops (null-excluded keys, re-adding an existing association)
    /// and [`EngineError::DuplicateKey`] when a UNIQUE constraint would be
    /// violated by a *different* RID.
    pub fn put(&self, key: CompositeKey, rid: Rid) -> Result<bool> {
        if self.ignores(&key) {
            return Ok(false);
        }
        match &mut *self.entries.write() {
            IndexEntries::Unique(map) => match map.get(&key) {
                Some(existing) if *existing == rid => Ok(false),
                Some(_) => Err(EngineError::DuplicateKey {
                    index: self.definition.name().to_string(),
                    key: key.to_string(),
                }),
                None => {
                    map.insert(key, rid);
                    Ok(true)
                }
            },
            IndexEntries::NotUnique(map) => Ok(map.entry(key).or_default().insert(rid)),
        }
    }

    /// Removes one key-to-RID association; a no-op if absent.
    ///
    /// Returns whether anything was removed.
    pub fn remove(&self, key: &CompositeKey, rid: Rid) -> bool {
        match &mut *self.entries.write() {
            IndexEntries::Unique(map) => match map.get(key) {
                Some(existing) if *existing == rid => {
                    map.remove(key);
                    true
                }
                _ => false,
            },
            IndexEntries::NotUnique(map) => {
                if let Some(rids) = map.get_mut(key) {
                    let removed = rids.remove(&rid);
                    if rids.is_empty() {
                        map.remove(key);
                    }
                    removed
                } else {
                    false
                }
            }
        }
    }

    /// Total number of key-to-RID associations.
    pub fn size(&self) -> usize {
        match &*self.entries.read() {
            IndexEntries::Unique(map) => map.len(),
            IndexEntries::NotUnique(map) => map.values().map(BTreeSet::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Distinct keys in ascending order.
    pub fn key_stream(&self) -> Vec<CompositeKey> {
        match &*self.entries.read() {
            IndexEntries::Unique(map) => map.keys().cloned().collect(),
            IndexEntries::NotUnique(map) => map.keys().cloned().collect(),
        }
    }

    /// Distinct RIDs across all keys, in ascending RID order.
    pub fn value_stream(&self) -> Vec<Rid> {
        let mut rids: BTreeSet<Rid> = BTreeSet::new();
        match &*self.entries.read() {
            IndexEntries::Unique(map) => rids.extend(map.values().copied()),
            IndexEntries::NotUnique(map) => {
                for set in map.values() {
                    rids.extend(set.iter().copied());
                }
            }
        }
        rids.into_iter().collect()
    }

    /// Every association as `(key, rid)` pairs in ascending key order.
    pub fn entries(&self) -> Vec<(CompositeKey, Rid)> {
        self.range(None, None, true, true, true)
    }

    /// Ordered scan over `[lower, upper]` with per-bound inclusivity.
    ///
    /// Either bound may be omitted for an unbounded side. The result is a
    /// finite, ordered, restartable sequence; descending order reverses it.
    pub fn range(
        &self,
        lower: Option<&CompositeKey>,
        upper: Option<&CompositeKey>,
        lower_inclusive: bool,
        upper_inclusive: bool,
        ascending: bool,
    ) -> Vec<(CompositeKey, Rid)> {
        if let (Some(low), Some(high)) = (lower, upper) {
            if low > high || (low == high && !(lower_inclusive && upper_inclusive)) {
                return Vec::new();
            }
        }
        let lower_bound = match lower {
            None => Bound::Unbounded,
            Some(key) if lower_inclusive => Bound::Included(key.clone()),
            Some(key) => Bound::Excluded(key.clone()),
        };
        let upper_bound = match upper {
            None => Bound::Unbounded,
            Some(key) if upper_inclusive => Bound::Included(key.clone()),
            Some(key) => Bound::Excluded(key.clone()),
        };

        let mut results = Vec::new();
        match &*self.entries.read() {
            IndexEntries::Unique(map) => {
                for (key, rid) in map.range((lower_bound, upper_bound)) {
                    results.push((key.clone(), *rid));
                }
            }
            IndexEntries::NotUnique(map) => {
                for (key, rids) in map.range((lower_bound, upper_bound)) {
                    for rid in rids {
                        results.push((key.clone(), *rid));
                    }
                }
            }
        }
        if !ascending {
            results.reverse();
        }
        results
    }

    /// Drops every entry. Used when the index is dropped or rebuilt.
    pub fn clear(&self) {
        match &mut *self.entries.write() {
            IndexEntries::Unique(map) => map.clear(),
            IndexEntries::NotUnique(map) => map.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::definition::CollectionIndexMode;
    use crate::key::Key;
    use crate::model::PropertyType;

    fn index(unique: bool, policy: NullPolicy) -> Index {
        let definition = IndexDefinition::new(
            "Person.name_idx",
            "Person",
            vec!["name".into()],
            vec![PropertyType::String],
            unique,
            policy,
            CollectionIndexMode::None,
        )
        .unwrap();
        let metadata = IndexMetadata::new(policy == NullPolicy::IgnoreNulls);
        Index::new(definition, metadata, vec![1])
    }

    fn key(text: &str) -> CompositeKey {
        CompositeKey::single(Key::String(text.into()))
    }

    #[test]
    fn not_unique_accumulates_rids_per_key() {
        let idx = index(false, NullPolicy::IgnoreNulls);
        assert!(idx.put(key("a"), Rid::new(1, 0)).unwrap());
        assert!(idx.put(key("a"), Rid::new(1, 1)).unwrap());
        // Re-adding the same association is a no-op.
        assert!(!idx.put(key("a"), Rid::new(1, 1)).unwrap());

        assert_eq!(idx.get(&key("a")), vec![Rid::new(1, 0), Rid::new(1, 1)]);
        assert_eq!(idx.size(), 2);
    }

    #[test]
    fn unique_rejects_second_rid_for_same_key() {
        let idx = index(true, NullPolicy::IgnoreNulls);
        idx.put(key("a"), Rid::new(1, 0)).unwrap();
        let err = idx.put(key("a"), Rid::new(1, 1)).unwrap_err();
        match err {
            EngineError::DuplicateKey { index, key } => {
                assert_eq!(index, "Person.name_idx");
                assert_eq!(key, "['a']");
            }
            other => panic!("expected duplicate key, got {other:?}"),
        }
        // Same RID under the same key is tolerated.
        assert!(!idx.put(key("a"), Rid::new(1, 0)).unwrap());
    }

    #[test]
    fn remove_is_a_noop_when_absent() {
        let idx = index(false, NullPolicy::IgnoreNulls);
        assert!(!idx.remove(&key("ghost"), Rid::new(1, 0)));
        idx.put(key("a"), Rid::new(1, 0)).unwrap();
        assert!(idx.remove(&key("a"), Rid::new(1, 0)));
        assert!(!idx.remove(&key("a"), Rid::new(1, 0)));
        assert_eq!(idx.size(), 0);
    }

    #[test]
    fn ignore_nulls_makes_null_keys_invisible() {
        let idx = index(false, NullPolicy::IgnoreNulls);
        let null_key = CompositeKey::single(Key::Null);
        assert!(!idx.put(null_key.clone(), Rid::new(1, 0)).unwrap());
        assert_eq!(idx.size(), 0);
        assert!(idx.get(&null_key).is_empty());
        assert!(idx.key_stream().is_empty());
    }

    #[test]
    fn index_nulls_treats_null_as_ordinary_key() {
        let idx = index(false, NullPolicy::IndexNulls);
        let null_key = CompositeKey::single(Key::Null);
        idx.put(null_key.clone(), Rid::new(1, 0)).unwrap();
        idx.put(null_key.clone(), Rid::new(1, 1)).unwrap();
        idx.put(key("a"), Rid::new(1, 2)).unwrap();

        assert_eq!(idx.get(&null_key).len(), 2);
        // Null sorts before any value in a full ascending scan.
        let keys = idx.key_stream();
        assert_eq!(keys[0], null_key);
    }

    #[test]
    fn unique_index_nulls_admits_single_null_entry() {
        let idx = index(true, NullPolicy::IndexNulls);
        let null_key = CompositeKey::single(Key::Null);
        idx.put(null_key.clone(), Rid::new(1, 0)).unwrap();
        let err = idx.put(null_key, Rid::new(1, 1)).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateKey { .. }));
    }

    #[test]
    fn range_respects_bounds_and_direction() {
        let idx = index(false, NullPolicy::IgnoreNulls);
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            idx.put(key(name), Rid::new(1, i as i64)).unwrap();
        }

        let inclusive = idx.range(Some(&key("b")), Some(&key("c")), true, true, true);
        assert_eq!(
            inclusive.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![key("b"), key("c")]
        );

        let exclusive = idx.range(Some(&key("a")), Some(&key("d")), false, false, true);
        assert_eq!(
            exclusive.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![key("b"), key("c")]
        );

        let descending = idx.range(None, Some(&key("c")), true, true, false);
        assert_eq!(
            descending.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![key("c"), key("b"), key("a")]
        );

        let unbounded = idx.range(None, None, true, true, true);
        assert_eq!(unbounded.len(), 4);
    }

    #[test]
    fn inverted_bounds_yield_empty_scan() {
        let idx = index(false, NullPolicy::IgnoreNulls);
        idx.put(key("a"), Rid::new(1, 0)).unwrap();
        assert!(idx
            .range(Some(&key("z")), Some(&key("a")), true, true, true)
            .is_empty());
        assert!(idx
            .range(Some(&key("a")), Some(&key("a")), false, false, true)
            .is_empty());
    }

    #[test]
    fn streams_report_distinct_keys_and_rids() {
        let idx = index(false, NullPolicy::IgnoreNulls);
        idx.put(key("a"), Rid::new(1, 0)).unwrap();
        idx.put(key("a"), Rid::new(1, 1)).unwrap();
        idx.put(key("b"), Rid::new(1, 0)).unwrap();

        assert_eq!(idx.key_stream(), vec![key("a"), key("b")]);
        assert_eq!(idx.value_stream(), vec![Rid::new(1, 0), Rid::new(1, 1)]);
        assert_eq!(idx.entries().len(), 3);
    }
}
