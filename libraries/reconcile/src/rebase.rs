//! Carrying local edits across a merge.
//!
//! A device that has edits the authority hasn't seen yet can't simply `merge(local, remote)`: leaves
//! come from `remote`, so every pending edit would be reverted. `rebase(base, local, merged)` takes
//! `base` (local state without the pending edits), `local` (with them), and `merged` (`base` after the
//! remote state was merged in). Wherever `local` still equals `base` the merged value is used; wherever
//! it differs the local value is laid over the merged one.
//!
//! Removing something locally is not an edit here, in line with [`merge`](crate::merge) never
//! propagating removals.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use crate::dataset::{Dataset, Object};
use crate::identity::{MemberKey, member_key};
use crate::merge::merge;
use crate::version::{METADATA_FIELDS, base_wins, is_versioned_object};

pub fn rebase(base: &Value, local: &Value, merged: &Value) -> Value {
    rebase_slot(Some(base), local, Some(merged))
}

pub fn rebase_dataset(base: &Dataset, local: &Dataset, merged: &Dataset) -> Dataset {
    Dataset {
        projects: rebase_keyed(&base.projects, &local.projects, &merged.projects, |b, l, m| {
            rebase_object(b, l, m)
        }),
        evidence: rebase_keyed(&base.evidence, &local.evidence, &merged.evidence, |b, l, m| {
            rebase_list(b.map(Vec::as_slice), l, m)
        }),
        global_settings: rebase_object(
            Some(&base.global_settings),
            &local.global_settings,
            &merged.global_settings,
        ),
        other: rebase_object(Some(&base.other), &local.other, &merged.other),
    }
}

fn rebase_slot(base: Option<&Value>, local: &Value, merged: Option<&Value>) -> Value {
    if base == Some(local) {
        return merged.unwrap_or(local).clone();
    }
    match (local, merged) {
        (Value::Object(l), Some(Value::Object(m))) => {
            Value::Object(rebase_object(base.and_then(Value::as_object), l, m))
        }
        (Value::Array(l), Some(Value::Array(m))) => Value::Array(rebase_list(
            base.and_then(Value::as_array).map(Vec::as_slice),
            l,
            m,
        )),
        (_, Some(m)) => merge(m, local),
        (_, None) => local.clone(),
    }
}

fn rebase_object(base: Option<&Object>, local: &Object, merged: &Object) -> Object {
    if base == Some(local) {
        return merged.clone();
    }

    let mut rebased = Object::new();
    for (key, value) in merged {
        let value = match local.get(key) {
            Some(l) => rebase_slot(base.and_then(|b| b.get(key)), l, Some(value)),
            None => value.clone(),
        };
        rebased.insert(key.clone(), value);
    }
    for (key, value) in local {
        if !merged.contains_key(key) {
            rebased.insert(key.clone(), value.clone());
        }
    }

    if is_versioned_object(merged) && is_versioned_object(local) {
        let winner = if base_wins(merged, local) {
            merged
        } else {
            local
        };
        for field in METADATA_FIELDS {
            if let Some(value) = winner.get(field) {
                rebased.insert(field.to_string(), value.clone());
            }
        }
    }

    rebased
}

fn rebase_list(base: Option<&[Value]>, local: &[Value], merged: &[Value]) -> Vec<Value> {
    if base == Some(local) {
        return merged.to_vec();
    }

    let base_members: HashMap<MemberKey, &Value> = base
        .unwrap_or_default()
        .iter()
        .map(|member| (member_key(member), member))
        .collect();
    let local_members: IndexMap<MemberKey, &Value> =
        local.iter().map(|member| (member_key(member), member)).collect();
    let merged_keys: IndexSet<MemberKey> = merged.iter().map(member_key).collect();

    let mut rebased: Vec<Value> = merged
        .iter()
        .map(|member| {
            let key = member_key(member);
            match local_members.get(&key) {
                Some(l) => rebase_slot(base_members.get(&key).copied(), l, Some(member)),
                None => member.clone(),
            }
        })
        .collect();
    rebased.extend(
        local_members
            .iter()
            .filter(|(key, _)| !merged_keys.contains(*key))
            .map(|(_, member)| (*member).clone()),
    );
    rebased
}

fn rebase_keyed<V: Clone>(
    base: &IndexMap<String, V>,
    local: &IndexMap<String, V>,
    merged: &IndexMap<String, V>,
    rebase_values: impl Fn(Option<&V>, &V, &V) -> V,
) -> IndexMap<String, V> {
    let mut rebased: IndexMap<String, V> = merged
        .iter()
        .map(|(key, value)| {
            let value = match local.get(key) {
                Some(l) => rebase_values(base.get(key), l, value),
                None => value.clone(),
            };
            (key.clone(), value)
        })
        .collect();
    for (key, value) in local {
        if !merged.contains_key(key) {
            rebased.insert(key.clone(), value.clone());
        }
    }
    rebased
}
