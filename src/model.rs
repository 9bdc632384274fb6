//! Core data model: record identifiers, property values and documents.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ridbag::RidBag;

/// Durable address of a record: collection id plus slot position.
///
/// A RID with a negative position is *temporary*: it was assigned inside an
/// open transaction and is rewritten to a durable RID when the transaction
/// commits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Rid {
    /// Identifier of the collection the record lives in.
    pub collection_id: i32,
    /// Slot position inside the collection.
    pub position: i64,
}

impl Rid {
    pub fn new(collection_id: i32, position: i64) -> Self {
        Self {
            collection_id,
            position,
        }
    }

    /// Whether this RID addresses a committed record.
    pub fn is_persistent(&self) -> bool {
        self.position >= 0
    }

    /// Whether this RID was assigned inside an open transaction.
    pub fn is_temporary(&self) -> bool {
        self.position < 0
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.collection_id, self.position)
    }
}

/// Declared type of a document property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Boolean,
    Integer,
    Float,
    String,
    DateTime,
    Link,
    EmbeddedList,
    EmbeddedMap,
    LinkBag,
}

impl PropertyType {
    /// Whether values of this type hold multiple elements.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            PropertyType::EmbeddedList | PropertyType::EmbeddedMap | PropertyType::LinkBag
        )
    }
}

/// A document property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Link(Rid),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Bag(RidBag),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Rewrites temporary RIDs embedded in this value to their durable
    /// counterparts. Used once, while a commit assigns durable identities.
    pub(crate) fn rewrite_rids(&mut self, mapping: &HashMap<Rid, Rid>) {
        match self {
            Value::Link(rid) => {
                if let Some(durable) = mapping.get(rid) {
                    *rid = *durable;
                }
            }
            Value::List(items) => {
                for item in items {
                    item.rewrite_rids(mapping);
                }
            }
            Value::Map(entries) => {
                for item in entries.values_mut() {
                    item.rewrite_rids(mapping);
                }
            }
            Value::Bag(bag) => bag.rewrite_rids(mapping),
            _ => {}
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Rid> for Value {
    fn from(value: Rid) -> Self {
        Value::Link(value)
    }
}

/// A schemaless record: a class name plus named property values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Name of the class this document belongs to.
    pub class_name: String,
    /// Property values keyed by field name.
    pub fields: HashMap<String, Value>,
}

impl Document {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: HashMap::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Returns the value of `field`, treating an absent field as null.
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub(crate) fn rewrite_rids(&mut self, mapping: &HashMap<Rid, Rid>) {
        for value in self.fields.values_mut() {
            value.rewrite_rids(mapping);
        }
    }
}
