//! Optimistic transaction context.
//!
//! A transaction buffers record operations and index changes privately;
//! nothing touches shared state until the outermost commit. Reads merge
//! the private buffers over committed state, so a transaction always sees
//! its own writes. Nested `begin` calls only bump a counter; the inner
//! `commit` calls unwind it and the outermost one performs the real
//! commit.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::db::engine::Engine;
use crate::db::index_changes::IndexChangeLog;
use crate::error::{EngineError, Result};
use crate::key::{codec, CompositeKey};
use crate::model::{Document, Rid};

/// Lifecycle of a transaction context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committing,
    Committed,
    Aborted,
    RolledBack,
}

/// A buffered record mutation, keyed by RID in the transaction.
#[derive(Debug, Clone)]
pub(crate) enum RecordOperation {
    Insert(Document),
    Update {
        expected_version: u64,
        document: Document,
    },
    Delete {
        expected_version: u64,
    },
}

/// A single optimistic transaction against one [`Engine`].
pub struct TransactionContext<'e> {
    pub(crate) engine: &'e Engine,
    pub(crate) id: u64,
    pub(crate) state: TxState,
    nesting: u32,
    sequence: u64,
    next_temp_position: i64,
    pub(crate) record_ops: BTreeMap<Rid, RecordOperation>,
    pub(crate) index_changes: BTreeMap<String, IndexChangeLog>,
}

impl<'e> TransactionContext<'e> {
    pub(crate) fn new(engine: &'e Engine, id: u64) -> Self {
        debug!(tx_id = id, "Transaction started");
        Self {
            engine,
            id,
            state: TxState::Active,
            nesting: 1,
            sequence: 0,
            next_temp_position: -2,
            record_ops: BTreeMap::new(),
            index_changes: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Opens a (possibly nested) transaction scope on this context.
    ///
    /// On an active context this only increments the nesting counter. A
    /// committed or rolled-back context starts a fresh cycle with a new
    /// transaction id. A context aborted by a failed commit refuses to
    /// restart until [`TransactionContext::rollback`] acknowledges the
    /// failure.
    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            TxState::Active | TxState::Committing => {
                self.nesting += 1;
                Ok(())
            }
            TxState::Aborted => Err(EngineError::Rollback(
                "transaction was aborted by a failed commit; roll back before starting a new one"
                    .to_string(),
            )),
            TxState::Committed | TxState::RolledBack => {
                self.reset(self.engine.next_tx_id());
                Ok(())
            }
        }
    }

    fn reset(&mut self, id: u64) {
        debug!(tx_id = id, "Transaction started");
        self.id = id;
        self.state = TxState::Active;
        self.nesting = 1;
        self.sequence = 0;
        self.next_temp_position = -2;
        self.record_ops.clear();
        self.index_changes.clear();
    }

    /// Commits the innermost open scope. Only the outermost commit applies
    /// the buffered changes; a failure there aborts the whole transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        if self.nesting > 1 {
            self.nesting -= 1;
            return Ok(());
        }
        self.state = TxState::Committing;
        match self.commit_outermost() {
            Ok(()) => {
                self.state = TxState::Committed;
                self.nesting = 0;
                Ok(())
            }
            Err(err) => {
                self.state = TxState::Aborted;
                self.nesting = 0;
                Err(err)
            }
        }
    }

    /// Discards every buffered change, from any state. Always succeeds and
    /// clears an aborted context so a new transaction can start.
    pub fn rollback(&mut self) {
        if self.state == TxState::Active && !self.record_ops.is_empty() {
            warn!(
                tx_id = self.id,
                pending = self.record_ops.len(),
                "Transaction rolled back with pending changes"
            );
        }
        self.record_ops.clear();
        self.index_changes.clear();
        self.nesting = 0;
        self.state = TxState::RolledBack;
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            TxState::Active => Ok(()),
            TxState::Aborted => Err(EngineError::Rollback(
                "transaction was aborted by a failed commit".to_string(),
            )),
            _ => Err(EngineError::Rollback(
                "transaction is not active".to_string(),
            )),
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }

    /// Buffers an insert and hands back the temporary RID the record is
    /// addressable under until commit remaps it to a persistent one.
    pub fn insert_into(&mut self, collection_id: i32, document: Document) -> Result<Rid> {
        self.ensure_active()?;
        let rid = Rid::new(collection_id, self.next_temp_position);
        self.next_temp_position -= 1;
        self.log_entries(&document, rid, true)?;
        self.record_ops
            .insert(rid, RecordOperation::Insert(document));
        Ok(rid)
    }

    /// Buffers a full-document replacement of `rid`.
    pub fn update(&mut self, rid: Rid, document: Document) -> Result<()> {
        self.ensure_active()?;
        let previous = self.read(rid).ok_or(EngineError::NotFound("record"))?;
        self.log_entries(&previous, rid, false)?;
        self.log_entries(&document, rid, true)?;

        let operation = match self.record_ops.get(&rid) {
            Some(RecordOperation::Insert(_)) => RecordOperation::Insert(document),
            Some(RecordOperation::Update {
                expected_version, ..
            }) => RecordOperation::Update {
                expected_version: *expected_version,
                document,
            },
            Some(RecordOperation::Delete { .. }) | None => RecordOperation::Update {
                expected_version: self
                    .engine
                    .store()
                    .version_of(rid)
                    .ok_or(EngineError::NotFound("record"))?,
                document,
            },
        };
        self.record_ops.insert(rid, operation);
        Ok(())
    }

    /// Buffers a delete of `rid`. Deleting a record inserted by this same
    /// transaction cancels the insert outright.
    pub fn delete(&mut self, rid: Rid) -> Result<()> {
        self.ensure_active()?;
        let previous = self.read(rid).ok_or(EngineError::NotFound("record"))?;
        self.log_entries(&previous, rid, false)?;

        match self.record_ops.get(&rid) {
            Some(RecordOperation::Insert(_)) => {
                self.record_ops.remove(&rid);
            }
            Some(RecordOperation::Update {
                expected_version, ..
            }) => {
                let expected_version = *expected_version;
                self.record_ops
                    .insert(rid, RecordOperation::Delete { expected_version });
            }
            Some(RecordOperation::Delete { .. }) | None => {
                let expected_version = self
                    .engine
                    .store()
                    .version_of(rid)
                    .ok_or(EngineError::NotFound("record"))?;
                self.record_ops
                    .insert(rid, RecordOperation::Delete { expected_version });
            }
        }
        Ok(())
    }

    /// Reads a record through the transaction: pending operations shadow
    /// committed state, a pending delete hides the record entirely.
    pub fn read(&self, rid: Rid) -> Option<Document> {
        match self.record_ops.get(&rid) {
            Some(RecordOperation::Insert(document))
            | Some(RecordOperation::Update { document, .. }) => Some(document.clone()),
            Some(RecordOperation::Delete { .. }) => None,
            None => self.engine.store().read(rid),
        }
    }

    /// Point lookup through the named index, merging this transaction's
    /// pending changes over the committed entries.
    pub fn index_get(&self, index_name: &str, key: &CompositeKey) -> Result<Vec<Rid>> {
        let index = self
            .engine
            .catalog()
            .get_index(index_name)
            .ok_or(EngineError::NotFound("index"))?;
        let base = index.get(key);
        Ok(match self.index_changes.get(index.name()) {
            Some(log) => log.effective(key, &base),
            None => base,
        })
    }

    /// Like [`TransactionContext::index_get`] for unique indexes.
    pub fn index_get_unique(
        &self,
        index_name: &str,
        key: &CompositeKey,
    ) -> Result<Option<Rid>> {
        Ok(self.index_get(index_name, key)?.into_iter().next())
    }

    /// Ordered range scan through the named index, with the transaction's
    /// pending changes merged in for every key inside the bounds.
    pub fn index_range(
        &self,
        index_name: &str,
        lower: Option<&CompositeKey>,
        upper: Option<&CompositeKey>,
        lower_inclusive: bool,
        upper_inclusive: bool,
        ascending: bool,
    ) -> Result<Vec<(CompositeKey, Rid)>> {
        let index = self
            .engine
            .catalog()
            .get_index(index_name)
            .ok_or(EngineError::NotFound("index"))?;
        let committed = index.range(lower, upper, lower_inclusive, upper_inclusive, ascending);

        let Some(log) = self.index_changes.get(index.name()) else {
            return Ok(committed);
        };
        if log.is_empty() {
            return Ok(committed);
        }

        // Group committed rows per key, then rebuild every key this
        // transaction touched from its effective view.
        let mut per_key: BTreeMap<CompositeKey, Vec<Rid>> = BTreeMap::new();
        for (key, rid) in committed {
            per_key.entry(key).or_default().push(rid);
        }
        for key in log.keys() {
            if !in_bounds(key, lower, upper, lower_inclusive, upper_inclusive) {
                continue;
            }
            let base = index.get(key);
            let effective = log.effective(key, &base);
            if effective.is_empty() {
                per_key.remove(key);
            } else {
                per_key.insert(key.clone(), effective);
            }
        }

        let mut rows: Vec<(CompositeKey, Rid)> = Vec::new();
        if ascending {
            for (key, rids) in per_key {
                rows.extend(rids.into_iter().map(|rid| (key.clone(), rid)));
            }
        } else {
            for (key, rids) in per_key.into_iter().rev() {
                rows.extend(rids.into_iter().map(|rid| (key.clone(), rid)));
            }
        }
        Ok(rows)
    }

    /// Records index change-log entries for one document under every index
    /// applicable to its class.
    fn log_entries(&mut self, document: &Document, rid: Rid, put: bool) -> Result<()> {
        let indexes = self
            .engine
            .catalog()
            .get_class_indexes(&document.class_name);
        for index in indexes {
            for (key, rid) in codec::entries_for_document(index.definition(), document, rid)? {
                if index.ignores(&key) {
                    continue;
                }
                let sequence = self.next_sequence();
                let log = self
                    .index_changes
                    .entry(index.name().to_string())
                    .or_default();
                if put {
                    log.log_put(sequence, key, rid);
                } else {
                    log.log_remove(sequence, key, rid);
                }
            }
        }
        Ok(())
    }
}

fn in_bounds(
    key: &CompositeKey,
    lower: Option<&CompositeKey>,
    upper: Option<&CompositeKey>,
    lower_inclusive: bool,
    upper_inclusive: bool,
) -> bool {
    if let Some(lower) = lower {
        if lower_inclusive {
            if key < lower {
                return false;
            }
        } else if key <= lower {
            return false;
        }
    }
    if let Some(upper) = upper {
        if upper_inclusive {
            if key > upper {
                return false;
            }
        } else if key >= upper {
            return false;
        }
    }
    true
}
