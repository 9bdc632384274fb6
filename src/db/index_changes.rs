//! Per-transaction, per-index change log.
//!
//! Every index mutation a transaction performs is recorded here instead of
//! touching the shared index; the entries carry a transaction-wide
//! sequence so commit can replay them in submission order, and reads merge
//! them over the committed state for read-your-writes visibility.

use std::collections::BTreeMap;

use crate::key::CompositeKey;
use crate::model::Rid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOperation {
    Put(Rid),
    Remove(Rid),
}

#[derive(Debug, Clone)]
pub struct IndexChangeEntry {
    pub sequence: u64,
    pub operation: IndexOperation,
}

/// Ordered log of pending changes for one index.
#[derive(Debug, Clone, Default)]
pub struct IndexChangeLog {
    changes: BTreeMap<CompositeKey, Vec<IndexChangeEntry>>,
}

impl IndexChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_put(&mut self, sequence: u64, key: CompositeKey, rid: Rid) {
        self.changes.entry(key).or_default().push(IndexChangeEntry {
            sequence,
            operation: IndexOperation::Put(rid),
        });
    }

    pub fn log_remove(&mut self, sequence: u64, key: CompositeKey, rid: Rid) {
        self.changes.entry(key).or_default().push(IndexChangeEntry {
            sequence,
            operation: IndexOperation::Remove(rid),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Keys touched by this transaction, ascending.
    pub fn keys(&self) -> impl Iterator<Item = &CompositeKey> {
        self.changes.keys()
    }

    pub fn entries_for(&self, key: &CompositeKey) -> Option<&[IndexChangeEntry]> {
        self.changes.get(key).map(Vec::as_slice)
    }

    /// All pending entries flattened, sorted by sequence.
    pub fn entries(&self) -> Vec<(CompositeKey, IndexChangeEntry)> {
        let mut flattened: Vec<(CompositeKey, IndexChangeEntry)> = self
            .changes
            .iter()
            .flat_map(|(key, entries)| entries.iter().map(|entry| (key.clone(), entry.clone())))
            .collect();
        flattened.sort_by_key(|(_, entry)| entry.sequence);
        flattened
    }

    /// Applies this key's pending operations over `base`, the committed
    /// RIDs. Duplicate puts and removes of absent RIDs are no-ops, so the
    /// merge is idempotent.
    pub fn effective(&self, key: &CompositeKey, base: &[Rid]) -> Vec<Rid> {
        let mut rids = base.to_vec();
        if let Some(entries) = self.changes.get(key) {
            let mut ordered: Vec<&IndexChangeEntry> = entries.iter().collect();
            ordered.sort_by_key(|entry| entry.sequence);
            for entry in ordered {
                match entry.operation {
                    IndexOperation::Put(rid) => {
                        if !rids.contains(&rid) {
                            rids.push(rid);
                        }
                    }
                    IndexOperation::Remove(rid) => {
                        if let Some(position) = rids.iter().position(|r| *r == rid) {
                            rids.remove(position);
                        }
                    }
                }
            }
        }
        rids
    }

    pub(crate) fn rewrite_rids(&mut self, mapping: &std::collections::HashMap<Rid, Rid>) {
        let mut rewritten: BTreeMap<CompositeKey, Vec<IndexChangeEntry>> = BTreeMap::new();
        for (key, entries) in std::mem::take(&mut self.changes) {
            let mut key = key;
            key.rewrite_rids(mapping);
            let rewritten_entries: Vec<IndexChangeEntry> = entries
                .into_iter()
                .map(|mut entry| {
                    entry.operation = match entry.operation {
                        IndexOperation::Put(rid) => {
                            IndexOperation::Put(mapping.get(&rid).copied().unwrap_or(rid))
                        }
                        IndexOperation::Remove(rid) => {
                            IndexOperation::Remove(mapping.get(&rid).copied().unwrap_or(rid))
                        }
                    };
                    entry
                })
                .collect();
            rewritten
                .entry(key)
                .or_default()
                .extend(rewritten_entries);
        }
        self.changes = rewritten;
    }
}
