//! Canonicalization of property values into comparable keys.
//!
//! The codec is the single seam between raw document values and index
//! keys. A value that cannot be canonicalized is a hard error
//! ([`EngineError::UnsupportedKeyType`]) propagated to the caller at the
//! point of mutation, never a silent skip.

use crate::error::{EngineError, Result};
use crate::index::{CollectionIndexMode, IndexDefinition};
use crate::key::{CompositeKey, Key};
use crate::model::{Document, PropertyType, Rid, Value};

/// Canonicalizes a single scalar value into a comparable key component.
///
/// Numeric widening folds a fraction-free, in-range float into its integer
/// form so `1` and `1.0` land on the same key. NaN is rejected because it
/// has no place in a total order.
pub fn canonicalize(value: &Value, declared: PropertyType) -> Result<Key> {
    match value {
        Value::Null => Ok(Key::Null),
        Value::Bool(v) => Ok(Key::Bool(*v)),
        Value::Int(v) => Ok(Key::Int(*v)),
        Value::Float(v) => float_key(*v),
        Value::String(v) => Ok(Key::String(v.clone())),
        Value::DateTime(v) => Ok(Key::DateTime(v.timestamp_millis())),
        Value::Link(rid) => Ok(Key::Link(*rid)),
        Value::List(_) | Value::Map(_) | Value::Bag(_) => Err(EngineError::UnsupportedKeyType(
            format!(
                "collection value of declared type {declared:?} cannot form a scalar key; \
                 declare a collection index mode"
            ),
        )),
    }
}

fn float_key(value: f64) -> Result<Key> {
    if value.is_nan() {
        return Err(EngineError::UnsupportedKeyType(
            "NaN cannot be ordered as an index key".into(),
        ));
    }
    const EXACT: f64 = (1i64 << 53) as f64;
    if value.fract() == 0.0 && value.abs() < EXACT {
        return Ok(Key::Int(value as i64));
    }
    Ok(Key::Float(value))
}

/// Expands a collection-typed value into one key per element.
///
/// Under `ByKey` every map key yields a component; under `ByValue` every
/// list element, map value or bag RID does. Each resulting key references
/// the same owning record, so a single document can contribute many
/// entries to one index.
pub fn expand_collection(
    value: &Value,
    declared: PropertyType,
    mode: CollectionIndexMode,
) -> Result<Vec<Key>> {
    match (value, mode) {
        (_, CollectionIndexMode::None) => Err(EngineError::UnsupportedKeyType(
            "collection expansion requires a ByKey or ByValue index mode".into(),
        )),
        // An absent collection contributes a single null-keyed entry; the
        // index's null policy decides whether it survives.
        (Value::Null, _) => Ok(vec![Key::Null]),
        (Value::List(items), CollectionIndexMode::ByValue) => items
            .iter()
            .map(|item| canonicalize(item, element_type(declared)))
            .collect(),
        (Value::List(_), CollectionIndexMode::ByKey) => Err(EngineError::UnsupportedKeyType(
            "lists have no keys; index them ByValue".into(),
        )),
        (Value::Map(entries), CollectionIndexMode::ByKey) => Ok(entries
            .keys()
            .map(|k| Key::String(k.clone()))
            .collect()),
        (Value::Map(entries), CollectionIndexMode::ByValue) => entries
            .values()
            .map(|item| canonicalize(item, element_type(declared)))
            .collect(),
        (Value::Bag(bag), CollectionIndexMode::ByValue) => {
            Ok(bag.to_vec().into_iter().map(Key::Link).collect())
        }
        (Value::Bag(_), CollectionIndexMode::ByKey) => Err(EngineError::UnsupportedKeyType(
            "link bags have no keys; index them ByValue".into(),
        )),
        (other, _) => Err(EngineError::UnsupportedKeyType(format!(
            "expected a collection for declared type {declared:?}, found {other:?}"
        ))),
    }
}

fn element_type(declared: PropertyType) -> PropertyType {
    match declared {
        PropertyType::LinkBag => PropertyType::Link,
        // Embedded lists and maps carry heterogeneous scalars; each element
        // canonicalizes by its own shape.
        _ => PropertyType::String,
    }
}

/// Derives every composite key one document contributes to one index.
///
/// At most one component may be collection-typed; the other components are
/// fixed and the expanded component fans out into one composite key per
/// element. Returns an empty vector for an empty collection (the document
/// then contributes no entries at all).
pub fn keys_for_document(
    definition: &IndexDefinition,
    document: &Document,
) -> Result<Vec<CompositeKey>> {
    let paths = definition.property_paths();
    let types = definition.declared_types();
    let mut fixed: Vec<Option<Key>> = Vec::with_capacity(paths.len());
    let mut expansion: Option<(usize, Vec<Key>)> = None;

    for (position, (path, declared)) in paths.iter().zip(types.iter()).enumerate() {
        let value = document.get(path);
        if declared.is_collection() {
            let keys = expand_collection(value, *declared, definition.collection_mode())?;
            expansion = Some((position, keys));
            fixed.push(None);
        } else {
            fixed.push(Some(canonicalize(value, *declared)?));
        }
    }

    match expansion {
        None => {
            let components = fixed.into_iter().flatten().collect();
            Ok(vec![CompositeKey::new(components)])
        }
        Some((position, element_keys)) => Ok(element_keys
            .into_iter()
            .map(|element| {
                let components = fixed
                    .iter()
                    .enumerate()
                    .map(|(i, slot)| {
                        if i == position {
                            element.clone()
                        } else {
                            slot.clone().unwrap_or(Key::Null)
                        }
                    })
                    .collect();
                CompositeKey::new(components)
            })
            .collect()),
    }
}

/// Derives a document's keys for the given RID, pairing each key with it.
pub fn entries_for_document(
    definition: &IndexDefinition,
    document: &Document,
    rid: Rid,
) -> Result<Vec<(CompositeKey, Rid)>> {
    Ok(keys_for_document(definition, document)?
        .into_iter()
        .map(|key| (key, rid))
        .collect())
}
