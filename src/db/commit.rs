//! Outermost commit: version validation, temporary-RID promotion and
//! ordered replay of buffered index changes.
//!
//! Commits are serialized by the store's commit lock. Inside the lock the
//! commit first validates every expected version, then promotes temporary
//! RIDs to freshly allocated persistent ones (rewriting every buffered
//! reference to them), replays the index change logs in submission order
//! and finally applies the record operations. A replay failure (a unique
//! violation surfacing at commit time) undoes the already-applied index
//! mutations before the error propagates, so shared indexes never expose
//! a half-applied transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::db::index_changes::{IndexChangeEntry, IndexOperation};
use crate::db::transaction::{RecordOperation, TransactionContext};
use crate::error::{EngineError, Result};
use crate::index::Index;
use crate::key::CompositeKey;
use crate::model::Rid;

/// One applied index mutation, remembered so a later failure can undo it.
struct AppliedChange {
    index: Arc<Index>,
    key: CompositeKey,
    rid: Rid,
    was_put: bool,
}

impl TransactionContext<'_> {
    pub(crate) fn commit_outermost(&mut self) -> Result<()> {
        let started = Instant::now();
        let store = self.engine.store();
        let _guard = store.lock_commits();

        // Optimistic validation: every update/delete must still see the
        // version it read.
        for (rid, operation) in &self.record_ops {
            let expected = match operation {
                RecordOperation::Insert(_) => continue,
                RecordOperation::Update {
                    expected_version, ..
                }
                | RecordOperation::Delete {
                    expected_version, ..
                } => *expected_version,
            };
            let actual = store.version_of(*rid).unwrap_or(0);
            if actual != expected {
                return Err(EngineError::ConcurrentModification {
                    rid: *rid,
                    expected,
                    actual,
                });
            }
        }

        // Promote temporary RIDs to persistent ones and rewrite every
        // buffered reference to them.
        let mut mapping: HashMap<Rid, Rid> = HashMap::new();
        for rid in self.record_ops.keys() {
            if rid.is_temporary() {
                let position = store.allocate_position(rid.collection_id);
                mapping.insert(*rid, Rid::new(rid.collection_id, position));
            }
        }
        let mut record_ops: BTreeMap<Rid, RecordOperation> = BTreeMap::new();
        for (rid, mut operation) in std::mem::take(&mut self.record_ops) {
            let rid = mapping.get(&rid).copied().unwrap_or(rid);
            match &mut operation {
                RecordOperation::Insert(document)
                | RecordOperation::Update { document, .. } => document.rewrite_rids(&mapping),
                RecordOperation::Delete { .. } => {}
            }
            record_ops.insert(rid, operation);
        }
        for log in self.index_changes.values_mut() {
            log.rewrite_rids(&mapping);
        }

        // Replay index changes across all indexes in submission order.
        let mut replay: Vec<(Arc<Index>, CompositeKey, IndexChangeEntry)> = Vec::new();
        for (name, log) in &self.index_changes {
            // An index dropped while the transaction ran has nothing left
            // to apply changes to.
            let Some(index) = self.engine.catalog().get_index(name) else {
                continue;
            };
            for (key, entry) in log.entries() {
                replay.push((Arc::clone(&index), key, entry));
            }
        }
        replay.sort_by_key(|(_, _, entry)| entry.sequence);

        let mut applied: Vec<AppliedChange> = Vec::new();
        for (index, key, entry) in replay {
            match entry.operation {
                IndexOperation::Put(rid) => match index.put(key.clone(), rid) {
                    Ok(true) => applied.push(AppliedChange {
                        index,
                        key,
                        rid,
                        was_put: true,
                    }),
                    Ok(false) => {}
                    Err(err) => {
                        undo(applied);
                        return Err(err);
                    }
                },
                IndexOperation::Remove(rid) => {
                    if index.remove(&key, rid) {
                        applied.push(AppliedChange {
                            index,
                            key,
                            rid,
                            was_put: false,
                        });
                    }
                }
            }
        }

        // Index replay succeeded; record application cannot fail.
        let records = record_ops.len();
        for (rid, operation) in record_ops {
            match operation {
                RecordOperation::Insert(document) => store.insert_record(rid, document),
                RecordOperation::Update {
                    expected_version,
                    document,
                } => store.replace_record(rid, expected_version + 1, document),
                RecordOperation::Delete { .. } => store.remove_record(rid),
            }
        }
        self.index_changes.clear();

        info!(
            tx_id = self.id,
            records,
            duration_us = started.elapsed().as_micros() as u64,
            "Transaction committed"
        );
        Ok(())
    }
}

/// Reverts already-applied index mutations, newest first.
fn undo(applied: Vec<AppliedChange>) {
    for change in applied.into_iter().rev() {
        if change.was_put {
            change.index.remove(&change.key, change.rid);
        } else {
            // Re-adding what this same commit removed cannot collide.
            let _ = change.index.put(change.key, change.rid);
        }
    }
}
