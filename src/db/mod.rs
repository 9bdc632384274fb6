//! Transactional engine: record store, transaction contexts and commit.

pub mod commit;
pub mod engine;
pub mod index_changes;
pub mod store;
pub mod transaction;

pub use engine::Engine;
pub use index_changes::{IndexChangeEntry, IndexChangeLog, IndexOperation};
pub use store::RecordStore;
pub use transaction::{TransactionContext, TxState};
