//! Adaptive RID multiset ("bag") attached to a document property.
//!
//! A bag behaves identically whether backed by the small in-document
//! representation ([`EmbeddedRidStorage`]) or the ordered tree
//! representation ([`TreeRidStorage`]); the two are swapped transparently
//! as the element count crosses the configured thresholds. Callers never
//! choose a strategy; only the size policy does.

pub mod changes;
pub mod embedded;
pub mod tree;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::de::{Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BagThresholds;
use crate::model::Rid;

pub use changes::RidBagChangeLog;
pub use embedded::EmbeddedRidStorage;
pub use tree::TreeRidStorage;

/// Non-owning back-reference from a bag to the document field holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagOwner {
    pub rid: Rid,
    pub field: String,
}

/// Closed set of storage strategies a bag can be backed by.
#[derive(Debug, Clone)]
enum BagStorage {
    Embedded(EmbeddedRidStorage),
    Tree(TreeRidStorage),
}

impl BagStorage {
    fn add(&mut self, rid: Rid) {
        match self {
            BagStorage::Embedded(storage) => storage.add(rid),
            BagStorage::Tree(storage) => storage.add(rid),
        }
    }

    fn remove(&mut self, rid: Rid) -> bool {
        match self {
            BagStorage::Embedded(storage) => storage.remove(rid),
            BagStorage::Tree(storage) => storage.remove(rid),
        }
    }

    fn contains(&self, rid: Rid) -> bool {
        match self {
            BagStorage::Embedded(storage) => storage.contains(rid),
            BagStorage::Tree(storage) => storage.contains(rid),
        }
    }

    fn multiplicity(&self, rid: Rid) -> usize {
        match self {
            BagStorage::Embedded(storage) => storage.multiplicity(rid),
            BagStorage::Tree(storage) => storage.multiplicity(rid),
        }
    }

    fn size(&self) -> usize {
        match self {
            BagStorage::Embedded(storage) => storage.size(),
            BagStorage::Tree(storage) => storage.size(),
        }
    }

    fn to_vec(&self) -> Vec<Rid> {
        match self {
            BagStorage::Embedded(storage) => storage.to_vec(),
            BagStorage::Tree(storage) => storage.to_vec(),
        }
    }
}

/// An unordered multiset of RIDs with adaptive storage.
///
/// `add` increments multiplicity, `remove` decrements it (a no-op when the
/// element is absent) and iteration yields one entry per multiplicity
/// unit. The promotion/demotion logic lives here, never in the storage
/// variants.
#[derive(Debug, Clone)]
pub struct RidBag {
    storage: BagStorage,
    owner: Option<BagOwner>,
    change_log: Option<RidBagChangeLog>,
    embedded_to_tree: i32,
    tree_to_embedded: i32,
}

impl Default for RidBag {
    fn default() -> Self {
        Self::new()
    }
}

impl RidBag {
    /// Creates an empty bag using the current process-wide thresholds.
    ///
    /// The thresholds are read once, here; later changes to the globals
    /// affect only bags created afterwards.
    pub fn new() -> Self {
        Self::with_thresholds(
            BagThresholds::embedded_to_tree(),
            BagThresholds::tree_to_embedded(),
        )
    }

    /// Creates an empty bag with explicit thresholds, pinning them for the
    /// lifetime of this bag.
    pub fn with_thresholds(embedded_to_tree: i32, tree_to_embedded: i32) -> Self {
        let storage = if embedded_to_tree < 0 {
            BagStorage::Tree(TreeRidStorage::new())
        } else {
            BagStorage::Embedded(EmbeddedRidStorage::new())
        };
        Self {
            storage,
            owner: None,
            change_log: None,
            embedded_to_tree,
            tree_to_embedded,
        }
    }

    /// Builds a bag from a sequence of RIDs, applying conversions as the
    /// elements are added.
    pub fn from_rids(rids: impl IntoIterator<Item = Rid>) -> Self {
        let mut bag = Self::new();
        for rid in rids {
            bag.add(rid);
        }
        bag
    }

    pub fn set_owner(&mut self, owner: Option<BagOwner>) {
        self.owner = owner;
    }

    pub fn owner(&self) -> Option<&BagOwner> {
        self.owner.as_ref()
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.storage, BagStorage::Embedded(_))
    }

    pub fn size(&self) -> usize {
        self.storage.size()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.size() == 0
    }

    pub fn contains(&self, rid: Rid) -> bool {
        self.storage.contains(rid)
    }

    pub fn multiplicity(&self, rid: Rid) -> usize {
        self.storage.multiplicity(rid)
    }

    /// Adds one occurrence of `rid`. Duplicates are allowed and counted.
    pub fn add(&mut self, rid: Rid) {
        self.storage.add(rid);
        if let Some(log) = &mut self.change_log {
            log.record(rid, 1);
        }
        self.check_and_convert();
    }

    /// Removes one occurrence of `rid`; absent elements are a silent
    /// no-op that never changes size.
    pub fn remove(&mut self, rid: Rid) {
        if self.storage.remove(rid) {
            if let Some(log) = &mut self.change_log {
                log.record(rid, -1);
            }
            self.check_and_convert();
        }
    }

    /// One RID per multiplicity unit. Embedded bags keep insertion order;
    /// tree bags yield RID order.
    pub fn to_vec(&self) -> Vec<Rid> {
        self.storage.to_vec()
    }

    /// Starts a snapshot cursor over the current contents.
    ///
    /// The cursor stays valid while the bag is mutated; a started
    /// iteration continues to reflect the snapshot it was created from.
    pub fn cursor(&self) -> RidBagCursor {
        RidBagCursor {
            snapshot: self.to_vec(),
            position: 0,
        }
    }

    fn check_and_convert(&mut self) {
        let size = self.storage.size();
        if self.is_embedded() {
            if self.embedded_to_tree >= 0 && size >= self.embedded_to_tree as usize {
                self.convert_to_tree();
            }
        } else if self.tree_to_embedded >= 0 && size <= self.tree_to_embedded as usize {
            self.convert_to_embedded();
        }
    }

    fn convert_to_tree(&mut self) {
        let mut tree = TreeRidStorage::new();
        for rid in self.storage.to_vec() {
            tree.add(rid);
        }
        debug!(size = tree.size(), "RidBag promoted to tree storage");
        self.storage = BagStorage::Tree(tree);
    }

    fn convert_to_embedded(&mut self) {
        let mut embedded = EmbeddedRidStorage::new();
        for rid in self.storage.to_vec() {
            embedded.add(rid);
        }
        debug!(size = embedded.size(), "RidBag demoted to embedded storage");
        self.storage = BagStorage::Embedded(embedded);
    }

    /// Begins recording add/remove deltas for the active transaction.
    ///
    /// Starting again discards any previously recorded deltas.
    pub fn begin_tracking(&mut self) {
        self.change_log = Some(RidBagChangeLog::new(self.is_embedded()));
    }

    /// Whether any net content change was recorded since tracking began.
    pub fn is_transaction_modified(&self) -> bool {
        self.change_log
            .as_ref()
            .map(RidBagChangeLog::is_modified)
            .unwrap_or(false)
    }

    /// Undoes exactly the operations recorded since tracking began,
    /// restoring both multiset contents and the storage strategy that was
    /// in effect at that point. Tracking stays enabled, re-based on the
    /// restored state.
    pub fn rollback_changes(&mut self) {
        let Some(log) = self.change_log.take() else {
            return;
        };
        for (rid, delta) in log.deltas() {
            if *delta > 0 {
                for _ in 0..*delta {
                    self.storage.remove(*rid);
                }
            } else {
                for _ in 0..delta.unsigned_abs() {
                    self.storage.add(*rid);
                }
            }
        }
        // Strategy is part of the pre-transaction observable state; force
        // it back regardless of the thresholds.
        if log.started_embedded() && !self.is_embedded() {
            self.convert_to_embedded();
        } else if !log.started_embedded() && self.is_embedded() {
            self.convert_to_tree();
        }
        self.change_log = Some(RidBagChangeLog::new(self.is_embedded()));
    }

    /// Forgets recorded deltas at the owning transaction's commit point.
    pub fn clear_changes(&mut self) {
        let embedded = self.is_embedded();
        if let Some(log) = &mut self.change_log {
            log.rebase(embedded);
        }
    }

    pub(crate) fn rewrite_rids(&mut self, mapping: &HashMap<Rid, Rid>) {
        let rewritten: Vec<Rid> = self
            .to_vec()
            .into_iter()
            .map(|rid| mapping.get(&rid).copied().unwrap_or(rid))
            .collect();
        self.storage = match &self.storage {
            BagStorage::Embedded(_) => {
                let mut storage = EmbeddedRidStorage::new();
                for rid in rewritten {
                    storage.add(rid);
                }
                BagStorage::Embedded(storage)
            }
            BagStorage::Tree(_) => {
                let mut storage = TreeRidStorage::new();
                for rid in rewritten {
                    storage.add(rid);
                }
                BagStorage::Tree(storage)
            }
        };
    }

    fn counts(&self) -> BTreeMap<Rid, usize> {
        let mut counts = BTreeMap::new();
        for rid in self.to_vec() {
            *counts.entry(rid).or_insert(0) += 1;
        }
        counts
    }
}

/// Multiset equality over contained RIDs, independent of storage strategy
/// and iteration order.
impl PartialEq for RidBag {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size() && self.counts() == other.counts()
    }
}

impl Eq for RidBag {}

/// Serializes as the ordered sequence of contained RIDs, duplicates
/// repeated per multiplicity, regardless of storage strategy.
impl Serialize for RidBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut rids = self.to_vec();
        rids.sort_unstable();
        let mut seq = serializer.serialize_seq(Some(rids.len()))?;
        for rid in rids {
            seq.serialize_element(&rid)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for RidBag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct BagVisitor;

        impl<'de> Visitor<'de> for BagVisitor {
            type Value = RidBag;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a sequence of RIDs")
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut bag = RidBag::new();
                while let Some(rid) = seq.next_element::<Rid>()? {
                    bag.add(rid);
                }
                Ok(bag)
            }
        }

        deserializer.deserialize_seq(BagVisitor)
    }
}

/// Snapshot-based cursor over a bag.
///
/// The cursor iterates the contents captured when it was created, so
/// interleaved `add`/`remove` calls on the same bag never invalidate it.
/// [`RidBagCursor::remove_current`] removes exactly the just-yielded
/// occurrence from the live bag.
#[derive(Debug)]
pub struct RidBagCursor {
    snapshot: Vec<Rid>,
    position: usize,
}

impl RidBagCursor {
    pub fn next(&mut self) -> Option<Rid> {
        let rid = self.snapshot.get(self.position).copied();
        if rid.is_some() {
            self.position += 1;
        }
        rid
    }

    /// The element most recently yielded by [`RidBagCursor::next`].
    pub fn current(&self) -> Option<Rid> {
        if self.position == 0 {
            None
        } else {
            self.snapshot.get(self.position - 1).copied()
        }
    }

    /// Removes the just-yielded occurrence from `bag`. Returns `false`
    /// when nothing has been yielded yet.
    pub fn remove_current(&self, bag: &mut RidBag) -> bool {
        match self.current() {
            Some(rid) => {
                bag.remove(rid);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(position: i64) -> Rid {
        Rid::new(1, position)
    }

    #[test]
    fn promotion_happens_exactly_once_at_the_threshold() {
        let mut bag = RidBag::with_thresholds(7, -1);
        for i in 0..6 {
            bag.add(rid(i));
        }
        assert!(bag.is_embedded());
        let before = bag.to_vec();

        bag.add(rid(6));
        assert!(!bag.is_embedded());

        // Contents are identical across the transition.
        let mut expected = before;
        expected.push(rid(6));
        expected.sort_unstable();
        let mut actual = bag.to_vec();
        actual.sort_unstable();
        assert_eq!(actual, expected);

        // Further additions do not transition again (already tree).
        bag.add(rid(7));
        assert!(!bag.is_embedded());
    }

    #[test]
    fn disabled_demotion_keeps_tree_storage() {
        let mut bag = RidBag::with_thresholds(7, -1);
        for i in 0..7 {
            bag.add(rid(i));
        }
        assert!(!bag.is_embedded());
        for i in 0..3 {
            bag.remove(rid(i));
        }
        assert_eq!(bag.size(), 4);
        assert!(!bag.is_embedded());
    }

    #[test]
    fn enabled_demotion_converts_back() {
        let mut bag = RidBag::with_thresholds(5, 2);
        for i in 0..5 {
            bag.add(rid(i));
        }
        assert!(!bag.is_embedded());
        bag.remove(rid(0));
        bag.remove(rid(1));
        bag.remove(rid(2));
        assert!(bag.is_embedded());
        assert_eq!(bag.size(), 2);
    }

    #[test]
    fn duplicates_are_counted_and_removed_one_at_a_time() {
        let mut bag = RidBag::with_thresholds(40, -1);
        bag.add(rid(1));
        bag.add(rid(1));
        bag.add(rid(1));
        assert_eq!(bag.size(), 3);
        assert_eq!(bag.multiplicity(rid(1)), 3);

        bag.remove(rid(1));
        assert_eq!(bag.multiplicity(rid(1)), 2);
        assert!(bag.contains(rid(1)));

        // Removing an absent element never errors and never changes size.
        bag.remove(rid(99));
        assert_eq!(bag.size(), 2);
    }

    #[test]
    fn cursor_survives_interleaved_mutation() {
        let mut bag = RidBag::with_thresholds(40, -1);
        for i in 0..4 {
            bag.add(rid(i));
        }
        let mut cursor = bag.cursor();
        assert_eq!(cursor.next(), Some(rid(0)));

        // Mutate the same bag mid-iteration.
        bag.add(rid(10));
        bag.remove(rid(3));

        // The cursor still walks its snapshot.
        assert_eq!(cursor.next(), Some(rid(1)));
        assert_eq!(cursor.next(), Some(rid(2)));
        assert_eq!(cursor.next(), Some(rid(3)));
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn cursor_remove_current_drops_single_occurrence() {
        let mut bag = RidBag::with_thresholds(40, -1);
        bag.add(rid(1));
        bag.add(rid(1));
        bag.add(rid(2));

        let mut cursor = bag.cursor();
        assert!(!cursor.remove_current(&mut bag));
        cursor.next();
        assert!(cursor.remove_current(&mut bag));
        assert_eq!(bag.multiplicity(rid(1)), 1);
        assert_eq!(bag.size(), 2);
    }

    #[test]
    fn rollback_restores_content_and_strategy() {
        let mut bag = RidBag::with_thresholds(5, -1);
        bag.add(rid(0));
        bag.add(rid(1));
        assert!(bag.is_embedded());

        bag.begin_tracking();
        for i in 2..8 {
            bag.add(rid(i));
        }
        bag.remove(rid(0));
        assert!(!bag.is_embedded());
        assert!(bag.is_transaction_modified());

        bag.rollback_changes();
        assert!(bag.is_embedded());
        assert_eq!(bag.size(), 2);
        assert!(bag.contains(rid(0)));
        assert!(bag.contains(rid(1)));
        assert!(!bag.contains(rid(5)));
        assert!(!bag.is_transaction_modified());
    }

    #[test]
    fn owner_is_carried_but_never_compared() {
        let mut a = RidBag::with_thresholds(40, -1);
        let mut b = RidBag::with_thresholds(40, -1);
        a.add(rid(1));
        b.add(rid(1));
        a.set_owner(Some(BagOwner {
            rid: rid(9),
            field: "friends".into(),
        }));

        assert_eq!(a.owner().unwrap().field, "friends");
        assert!(b.owner().is_none());
        assert_eq!(a, b);
    }

    #[test]
    fn equality_is_multiset_equality_across_strategies() {
        let mut embedded = RidBag::with_thresholds(40, -1);
        let mut tree = RidBag::with_thresholds(-1, -1);
        assert!(embedded.is_embedded());
        assert!(!tree.is_embedded());

        for i in [3, 1, 1, 2] {
            embedded.add(rid(i));
        }
        for i in [1, 2, 3, 1] {
            tree.add(rid(i));
        }
        assert_eq!(embedded, tree);

        tree.remove(rid(1));
        assert_ne!(embedded, tree);
    }
}
