//! Ordered multiplicity-map representation for large bags.
//!
//! Mirrors the page-backed tree of a persistent engine: entries are kept
//! as RID-to-count pairs in RID order and iteration walks the map lazily,
//! yielding one logical element per unit of multiplicity.

use std::collections::BTreeMap;

use crate::model::Rid;

#[derive(Debug, Clone, Default)]
pub struct TreeRidStorage {
    entries: BTreeMap<Rid, u32>,
    total: usize,
}

impl TreeRidStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rid: Rid) {
        *self.entries.entry(rid).or_insert(0) += 1;
        self.total += 1;
    }

    /// Decrements multiplicity; returns whether anything was removed.
    /// A RID whose count reaches zero is dropped, never materialized.
    pub fn remove(&mut self, rid: Rid) -> bool {
        match self.entries.get_mut(&rid) {
            Some(count) if *count > 1 => {
                *count -= 1;
                self.total -= 1;
                true
            }
            Some(_) => {
                self.entries.remove(&rid);
                self.total -= 1;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, rid: Rid) -> bool {
        self.entries.contains_key(&rid)
    }

    pub fn multiplicity(&self, rid: Rid) -> usize {
        self.entries.get(&rid).copied().unwrap_or(0) as usize
    }

    pub fn size(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Lazy cursor over the tree, one element per multiplicity unit, in
    /// RID order.
    pub fn iter(&self) -> impl Iterator<Item = Rid> + '_ {
        self.entries
            .iter()
            .flat_map(|(rid, count)| std::iter::repeat(*rid).take(*count as usize))
    }

    pub fn to_vec(&self) -> Vec<Rid> {
        self.iter().collect()
    }
}
