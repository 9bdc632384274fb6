//! Small multiset representation held inline with the owning document.

use crate::model::Rid;

/// Insertion-ordered RID multiset for small bags.
///
/// Duplicates are stored as repeated elements; removal drops the first
/// occurrence only.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedRidStorage {
    entries: Vec<Rid>,
}

impl EmbeddedRidStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rid: Rid) {
        self.entries.push(rid);
    }

    /// Removes one occurrence; returns whether anything was removed.
    pub fn remove(&mut self, rid: Rid) -> bool {
        if let Some(position) = self.entries.iter().position(|entry| *entry == rid) {
            self.entries.remove(position);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, rid: Rid) -> bool {
        self.entries.contains(&rid)
    }

    pub fn multiplicity(&self, rid: Rid) -> usize {
        self.entries.iter().filter(|entry| **entry == rid).count()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Rid> + '_ {
        self.entries.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<Rid> {
        self.entries.clone()
    }
}
