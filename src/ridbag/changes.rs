//! Per-transaction delta accounting for one bag instance.
//!
//! The log records the net add/remove delta per RID since tracking began,
//! plus the storage strategy observed at that point. Rollback applies the
//! inverse deltas instead of restoring a deep copy.

use std::collections::BTreeMap;

use crate::model::Rid;

#[derive(Debug, Clone)]
pub struct RidBagChangeLog {
    deltas: BTreeMap<Rid, i64>,
    started_embedded: bool,
}

impl RidBagChangeLog {
    pub fn new(started_embedded: bool) -> Self {
        Self {
            deltas: BTreeMap::new(),
            started_embedded,
        }
    }

    /// Records one add (`+1`) or remove (`-1`) of `rid`.
    pub fn record(&mut self, rid: Rid, delta: i64) {
        let entry = self.deltas.entry(rid).or_insert(0);
        *entry += delta;
        if *entry == 0 {
            self.deltas.remove(&rid);
        }
    }

    /// Whether any net content change has been recorded.
    pub fn is_modified(&self) -> bool {
        !self.deltas.is_empty()
    }

    /// Storage strategy in effect when tracking began.
    pub fn started_embedded(&self) -> bool {
        self.started_embedded
    }

    /// Net deltas per RID, ready to be inverted for rollback.
    pub fn deltas(&self) -> &BTreeMap<Rid, i64> {
        &self.deltas
    }

    /// Forgets recorded deltas and re-bases the log on `embedded`, as the
    /// commit point of the owning transaction.
    pub fn rebase(&mut self, embedded: bool) {
        self.deltas.clear();
        self.started_embedded = embedded;
    }
}
