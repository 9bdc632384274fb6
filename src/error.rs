//! Error handling for Umbra operations.
//!
//! This module defines the error types used throughout the Umbra indexing
//! core. All public APIs return `Result<T, EngineError>` for consistent
//! error handling.
//!
//! # Error Types
//!
//! - [`EngineError`] - Main error enum with variants for different failure modes
//! - [`Result`] - Result type alias for convenience
//!
//! # Error Handling Pattern
//!
//! ```rust
//! use umbra::{Engine, Result};
//!
//! fn safe_operation(engine: &Engine) -> Result<()> {
//!     let mut tx = engine.begin();
//!     // ... operations ...
//!     tx.commit()?;
//!     Ok(())
//! }
//! ```

use crate::model::Rid;
use thiserror::Error;

/// Result type for Umbra operations.
///
/// All public APIs return `Result<T, EngineError>` for error handling.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during index and transaction operations.
///
/// Every variant is a synchronous, caller-visible failure. Cases that are
/// recoverable by design (dropping a missing index, removing an absent bag
/// element) are silent no-ops and never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A property value cannot be canonicalized into an index key.
    ///
    /// Raised at the point of mutation, never deferred to commit. Typical
    /// causes are embedded collections indexed without a collection mode
    /// and non-finite floating point values.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// A UNIQUE constraint would be violated.
    ///
    /// Raised while replaying the transaction change log at commit time.
    /// The whole transaction aborts; no index or record change is applied.
    #[error("duplicate key '{key}' in index '{index}'")]
    DuplicateKey {
        /// Name of the index whose constraint was violated.
        index: String,
        /// Rendered form of the offending key.
        key: String,
    },

    /// A touched record's version no longer matches the expected version
    /// at commit. The whole transaction aborts.
    #[error("record {rid} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification {
        /// Identifier of the conflicting record.
        rid: Rid,
        /// Version the transaction observed when it loaded the record.
        expected: u64,
        /// Version currently stored for the record.
        actual: u64,
    },

    /// The caller attempted to continue a transaction whose prior commit
    /// failed without first rolling it back.
    #[error("transaction must be rolled back: {0}")]
    Rollback(String),

    /// An index with the same name is already registered.
    #[error("index '{0}' already exists")]
    IndexAlreadyExists(String),

    /// A referenced class or property is undeclared, or an index
    /// definition is internally inconsistent.
    #[error("schema inconsistency: {0}")]
    SchemaInconsistency(String),

    /// Requested resource was not found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Invalid argument or operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
