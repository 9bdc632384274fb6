//! Committed record storage keyed by RID.
//!
//! The store is the durable side of the engine: every record carries a
//! monotonically increasing version used for optimistic conflict checks,
//! and position allocation per collection is the source of persistent
//! RIDs. All mutation goes through the commit path; readers see only
//! committed state.

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::model::{Document, Rid};

/// A committed record plus its optimistic-concurrency version.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub version: u64,
    pub document: Document,
}

/// Versioned in-memory record store.
pub struct RecordStore {
    records: DashMap<Rid, StoredRecord>,
    next_positions: DashMap<i32, i64>,
    commit_lock: Mutex<()>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_positions: DashMap::new(),
            commit_lock: Mutex::new(()),
        }
    }

    /// Reads the committed document for `rid`, if any.
    pub fn read(&self, rid: Rid) -> Option<Document> {
        self.records.get(&rid).map(|entry| entry.document.clone())
    }

    /// Version of the committed record, if it exists.
    pub fn version_of(&self, rid: Rid) -> Option<u64> {
        self.records.get(&rid).map(|entry| entry.version)
    }

    pub fn contains(&self, rid: Rid) -> bool {
        self.records.contains_key(&rid)
    }

    /// All committed records of one collection, in position order.
    pub fn scan_collection(&self, collection_id: i32) -> Vec<(Rid, Document)> {
        let mut records: Vec<(Rid, Document)> = self
            .records
            .iter()
            .filter(|entry| entry.key().collection_id == collection_id)
            .map(|entry| (*entry.key(), entry.document.clone()))
            .collect();
        records.sort_by_key(|(rid, _)| rid.position);
        records
    }

    pub fn collection_len(&self, collection_id: i32) -> usize {
        self.records
            .iter()
            .filter(|entry| entry.key().collection_id == collection_id)
            .count()
    }

    /// Hands out the next persistent position for `collection_id`.
    pub(crate) fn allocate_position(&self, collection_id: i32) -> i64 {
        let mut next = self.next_positions.entry(collection_id).or_insert(0);
        let position = *next;
        *next += 1;
        position
    }

    pub(crate) fn insert_record(&self, rid: Rid, document: Document) {
        self.records.insert(
            rid,
            StoredRecord {
                version: 1,
                document,
            },
        );
    }

    pub(crate) fn replace_record(&self, rid: Rid, version: u64, document: Document) {
        self.records.insert(rid, StoredRecord { version, document });
    }

    pub(crate) fn remove_record(&self, rid: Rid) {
        self.records.remove(&rid);
    }

    /// Serializes commit application; held for the version-check/apply
    /// window only.
    pub(crate) fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock()
    }
}
