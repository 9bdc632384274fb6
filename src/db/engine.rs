//! Engine facade tying the record store, the index catalog and the
//! transaction machinery together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::db::store::RecordStore;
use crate::db::transaction::TransactionContext;
use crate::error::Result;
use crate::index::{
    ClassDescriptor, Index, IndexCatalog, IndexDefinition, IndexMetadata, NoProgress,
    ProgressListener,
};
use crate::model::{Document, Rid};

/// The storage engine: committed records plus the index catalog.
///
/// All mutation flows through [`Engine::begin`] and the returned
/// [`TransactionContext`]; the engine itself only exposes committed state.
pub struct Engine {
    store: RecordStore,
    catalog: IndexCatalog,
    next_tx_id: AtomicU64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            store: RecordStore::new(),
            catalog: IndexCatalog::new(),
            next_tx_id: AtomicU64::new(1),
        }
    }

    /// Starts a new optimistic transaction bound to this engine.
    pub fn begin(&self) -> TransactionContext<'_> {
        TransactionContext::new(self, self.next_tx_id())
    }

    pub(crate) fn next_tx_id(&self) -> u64 {
        self.next_tx_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.catalog
    }

    /// Declares a class so indexes can reference it.
    pub fn register_class(&self, descriptor: ClassDescriptor) {
        self.catalog.register_class(descriptor);
    }

    /// Creates an index, backfilling it from committed records.
    pub fn create_index(
        &self,
        definition: IndexDefinition,
        metadata: Option<IndexMetadata>,
        target_collections: Vec<i32>,
    ) -> Result<Arc<Index>> {
        self.catalog
            .create_index(definition, metadata, target_collections, &NoProgress, &self.store)
    }

    /// Creates an index with build-progress callbacks.
    pub fn create_index_with_progress(
        &self,
        definition: IndexDefinition,
        metadata: Option<IndexMetadata>,
        target_collections: Vec<i32>,
        listener: &dyn ProgressListener,
    ) -> Result<Arc<Index>> {
        self.catalog
            .create_index(definition, metadata, target_collections, listener, &self.store)
    }

    /// Clears and rebuilds an index from committed records.
    pub fn rebuild_index(&self, name: &str, listener: &dyn ProgressListener) -> Result<usize> {
        self.catalog.rebuild_index(name, listener, &self.store)
    }

    /// Drops an index; dropping an unknown name is a no-op.
    pub fn drop_index(&self, name: &str) {
        self.catalog.drop_index(name);
    }

    /// Reads a committed record outside any transaction.
    pub fn read(&self, rid: Rid) -> Option<Document> {
        self.store.read(rid)
    }
}
