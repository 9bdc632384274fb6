//! Canonical, totally-ordered index keys.
//!
//! Property values are canonicalized by [`codec`] into [`Key`] components;
//! one or more components form a [`CompositeKey`], which is what an index
//! actually orders its entries by. The null sentinel is a distinct key that
//! compares less than any non-null component.

pub mod codec;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Rid;

/// A single canonicalized key component.
///
/// Numbers are widened to one comparable representation: integers and
/// floats compare numerically with each other, and the codec folds a
/// fraction-free float into its integer form so equal numeric values
/// produce equal keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Key {
    /// The null sentinel. Orders before any non-null component.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Absolute instant as milliseconds since the Unix epoch.
    DateTime(i64),
    Link(Rid),
}

impl Key {
    fn rank(&self) -> u8 {
        match self {
            Key::Null => 0,
            Key::Bool(_) => 1,
            Key::Int(_) | Key::Float(_) => 2,
            Key::String(_) => 3,
            Key::DateTime(_) => 4,
            Key::Link(_) => 5,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Key::Null)
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Null, Key::Null) => Ordering::Equal,
            (Key::Bool(a), Key::Bool(b)) => a.cmp(b),
            (Key::Int(a), Key::Int(b)) => a.cmp(b),
            (Key::Float(a), Key::Float(b)) => a.total_cmp(b),
            // Cross-type numeric comparison; the codec guarantees float keys
            // carry a fractional part or exceed the exact integer range, so
            // equality across the two forms cannot arise.
            (Key::Int(a), Key::Float(b)) => (*a as f64).total_cmp(b),
            (Key::Float(a), Key::Int(b)) => a.total_cmp(&(*b as f64)),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::DateTime(a), Key::DateTime(b)) => a.cmp(b),
            (Key::Link(a), Key::Link(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => write!(f, "null"),
            Key::Bool(v) => write!(f, "{v}"),
            Key::Int(v) => write!(f, "{v}"),
            Key::Float(v) => write!(f, "{v}"),
            Key::String(v) => write!(f, "'{v}'"),
            Key::DateTime(v) => write!(f, "@{v}"),
            Key::Link(v) => write!(f, "{v}"),
        }
    }
}

/// An ordered tuple of key components, compared lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey(Vec<Key>);

impl CompositeKey {
    pub fn new(components: Vec<Key>) -> Self {
        Self(components)
    }

    pub fn single(component: Key) -> Self {
        Self(vec![component])
    }

    pub fn components(&self) -> &[Key] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any component is the null sentinel.
    pub fn has_null(&self) -> bool {
        self.0.iter().any(Key::is_null)
    }

    pub(crate) fn rewrite_rids(&mut self, mapping: &HashMap<Rid, Rid>) {
        for component in &mut self.0 {
            if let Key::Link(rid) = component {
                if let Some(durable) = mapping.get(rid) {
                    *rid = *durable;
                }
            }
        }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{component}")?;
        }
        write!(f, "]")
    }
}

impl From<Key> for CompositeKey {
    fn from(component: Key) -> Self {
        CompositeKey::single(component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_orders_before_every_value() {
        let values = [
            Key::Bool(false),
            Key::Int(i64::MIN),
            Key::Float(-1.5e300),
            Key::String(String::new()),
            Key::DateTime(i64::MIN),
            Key::Link(Rid::new(i32::MIN, i64::MIN)),
        ];
        for value in values {
            assert!(Key::Null < value, "null must precede {value}");
        }
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert!(Key::Int(1) < Key::Float(1.5));
        assert!(Key::Float(1.5) < Key::Int(2));
        assert!(Key::Float(-0.5) < Key::Int(0));
        assert_eq!(Key::Int(3), Key::Int(3));
    }

    #[test]
    fn composite_keys_compare_lexicographically() {
        let a = CompositeKey::new(vec![Key::String("a".into()), Key::Int(2)]);
        let b = CompositeKey::new(vec![Key::String("a".into()), Key::Int(3)]);
        let c = CompositeKey::new(vec![Key::String("b".into()), Key::Int(0)]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn null_component_sorts_first_within_prefix() {
        let with_null = CompositeKey::new(vec![Key::String("a".into()), Key::Null]);
        let without = CompositeKey::new(vec![Key::String("a".into()), Key::Int(i64::MIN)]);
        assert!(with_null < without);
    }

    #[test]
    fn display_renders_components() {
        let key = CompositeKey::new(vec![Key::String("a".into()), Key::Int(25), Key::Null]);
        assert_eq!(key.to_string(), "['a', 25, null]");
    }
}
