//! Process-wide runtime settings.
//!
//! This module holds the two thresholds that govern the adaptive storage
//! strategy of [`crate::RidBag`]. Both are mutable at runtime; a change
//! takes effect for bags created afterwards, never retroactively for bags
//! that already materialized their strategy.
//!
//! # Example
//!
//! ```rust
//! use umbra::BagThresholds;
//!
//! // Promote to the tree representation earlier than the default.
//! BagThresholds::set_embedded_to_tree(16);
//!
//! // Re-enable demotion back to the embedded representation.
//! BagThresholds::set_tree_to_embedded(8);
//! ```

use std::sync::atomic::{AtomicI32, Ordering};

/// Element count at or above which an embedded bag converts to the
/// tree-backed representation. Negative means "always tree".
static EMBEDDED_TO_TREE: AtomicI32 = AtomicI32::new(40);

/// Element count at or below which a tree-backed bag converts back to the
/// embedded representation. Negative disables demotion.
static TREE_TO_EMBEDDED: AtomicI32 = AtomicI32::new(-1);

/// Accessors for the process-wide RidBag conversion thresholds.
///
/// The defaults (40 / -1) promote a bag to the tree representation once it
/// reaches 40 elements and never demote it back. A bag reads both values
/// once, when it is created; see [`crate::RidBag::with_thresholds`] to pin
/// values for a single bag regardless of the globals.
pub struct BagThresholds;

impl BagThresholds {
    /// Current embedded-to-tree promotion threshold.
    pub fn embedded_to_tree() -> i32 {
        EMBEDDED_TO_TREE.load(Ordering::Relaxed)
    }

    /// Sets the embedded-to-tree promotion threshold.
    ///
    /// A negative value makes new bags start tree-backed immediately.
    pub fn set_embedded_to_tree(value: i32) {
        EMBEDDED_TO_TREE.store(value, Ordering::Relaxed);
    }

    /// Current tree-to-embedded demotion threshold.
    pub fn tree_to_embedded() -> i32 {
        TREE_TO_EMBEDDED.load(Ordering::Relaxed)
    }

    /// Sets the tree-to-embedded demotion threshold.
    ///
    /// A negative value disables demotion, making promotion one-directional.
    pub fn set_tree_to_embedded(value: i32) {
        TREE_TO_EMBEDDED.store(value, Ordering::Relaxed);
    }
}
