//! Umbra: a transactional document engine with secondary indexes and
//! adaptive RID collections.
//!
//! The crate is organized around three pillars:
//!
//! - [`db`]: the [`Engine`], the versioned record store and the
//!   optimistic [`TransactionContext`] that buffers record and index
//!   changes until commit.
//! - [`index`]: ordered secondary indexes over canonical composite keys,
//!   owned by an [`IndexCatalog`] that handles creation, backfill,
//!   rebuild and involved-index resolution.
//! - [`ridbag`]: the adaptive RID multiset attached to link-bag
//!   properties, switching between an embedded and a tree representation
//!   as it grows and shrinks.
//!
//! ```no_run
//! use umbra::{Document, Engine, Value};
//!
//! let engine = Engine::new();
//! let mut tx = engine.begin();
//! let rid = tx.insert_into(1, Document::new("Person").with("name", Value::from("ada")))?;
//! tx.commit()?;
//! # Ok::<(), umbra::EngineError>(())
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod key;
pub mod logging;
pub mod model;
pub mod ridbag;

pub use config::BagThresholds;
pub use db::{Engine, RecordStore, TransactionContext, TxState};
pub use error::{EngineError, Result};
pub use index::{
    class_with_properties, ClassDescriptor, CollectionIndexMode, Index, IndexCatalog,
    IndexDefinition, IndexMetadata, NoProgress, NullPolicy, ProgressListener,
};
pub use key::{CompositeKey, Key};
pub use logging::{init_json_logging, init_logging};
pub use model::{Document, PropertyType, Rid, Value};
pub use ridbag::{BagOwner, RidBag, RidBagCursor};
