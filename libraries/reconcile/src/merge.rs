//! The recursive merge shared by the authority and every client.
//!
//! `merge(base, incoming)` looks at the two values and picks the first rule that applies:
//!
//! 1. Both are versioned objects. The version winner (see [`compare_versioned`]) provides `id`,
//!    `createdAt`, `updatedAt` and `version`. Every other field is merged recursively on its own, so a
//!    field can hold `incoming`'s value even though `base` won the version race.
//! 2. One side is a versioned object and the other is missing or `null`. The versioned side is returned.
//! 3. Both are lists. Members are matched by [`member_key`] and merged pairwise; unmatched members from
//!    either side are kept, `base`'s first. Nothing is ever removed.
//! 4. Both are plain objects: merge key by key. Otherwise `incoming` wins if it is there at all.
//!
//! [`compare_versioned`]: crate::version::compare_versioned

use indexmap::IndexMap;
use serde_json::Value;

use crate::dataset::{Dataset, Object};
use crate::identity::{MemberKey, member_key};
use crate::version::{METADATA_FIELDS, base_wins, is_versioned, is_versioned_object};

pub fn merge(base: &Value, incoming: &Value) -> Value {
    merge_slot(Some(base), Some(incoming)).unwrap_or(Value::Null)
}

/// Merge what the authority has stored with what a device sent.
pub fn merge_dataset(stored: &Dataset, incoming: &Dataset) -> Dataset {
    Dataset {
        projects: merge_keyed(&stored.projects, &incoming.projects, merge_objects),
        evidence: merge_keyed(&stored.evidence, &incoming.evidence, |b, i| {
            merge_lists(b, i)
        }),
        global_settings: merge_objects(&stored.global_settings, &incoming.global_settings),
        other: merge_objects(&stored.other, &incoming.other),
    }
}

/// `None` stands for a field that one side doesn't have at all.
fn merge_slot(base: Option<&Value>, incoming: Option<&Value>) -> Option<Value> {
    match (base, incoming) {
        (Some(Value::Object(b)), Some(Value::Object(i))) => Some(Value::Object(merge_objects(b, i))),
        (Some(b), None | Some(Value::Null)) if is_versioned(b) => Some(b.clone()),
        (None | Some(Value::Null), Some(i)) if is_versioned(i) => Some(i.clone()),
        (Some(Value::Array(b)), Some(Value::Array(i))) => Some(Value::Array(merge_lists(b, i))),
        (_, Some(i)) => Some(i.clone()),
        (b, None) => b.cloned(),
    }
}

fn merge_objects(base: &Object, incoming: &Object) -> Object {
    let mut merged = Object::new();
    for (key, value) in base {
        if let Some(value) = merge_slot(Some(value), incoming.get(key)) {
            merged.insert(key.clone(), value);
        }
    }
    for (key, value) in incoming {
        if !base.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    if is_versioned_object(base) && is_versioned_object(incoming) {
        let winner = if base_wins(base, incoming) {
            base
        } else {
            incoming
        };
        for field in METADATA_FIELDS {
            if let Some(value) = winner.get(field) {
                merged.insert(field.to_string(), value.clone());
            }
        }
    }

    merged
}

fn merge_lists(base: &[Value], incoming: &[Value]) -> Vec<Value> {
    let mut index: IndexMap<MemberKey, Value> = IndexMap::with_capacity(base.len());
    for member in base {
        index.insert(member_key(member), member.clone());
    }
    for member in incoming {
        let key = member_key(member);
        match index.get_mut(&key) {
            Some(existing) => *existing = merge(existing, member),
            None => {
                index.insert(key, member.clone());
            }
        }
    }
    index.into_values().collect()
}

fn merge_keyed<V: Clone>(
    base: &IndexMap<String, V>,
    incoming: &IndexMap<String, V>,
    merge_values: impl Fn(&V, &V) -> V,
) -> IndexMap<String, V> {
    let mut merged = base.clone();
    for (key, value) in incoming {
        match merged.get_mut(key) {
            Some(existing) => *existing = merge_values(existing, value),
            None => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}
