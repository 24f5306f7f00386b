//! Identity, timestamp and version metadata on domain objects.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::Object;

pub const ID: &str = "id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";
pub const VERSION: &str = "version";

/// The fields that always come from the winner of a version comparison.
pub const METADATA_FIELDS: [&str; 4] = [ID, CREATED_AT, UPDATED_AT, VERSION];

/// Timestamps are written the way browsers write them: UTC, millisecond precision, `Z` suffix.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fill in whatever metadata is missing, leaving populated fields alone.
pub fn ensure<'a>(entity: &'a mut Object, kind_prefix: &str) -> &'a mut Object {
    if is_blank(entity.get(ID)) {
        let suffix = uuid::Uuid::new_v4().simple();
        entity.insert(ID.to_string(), Value::from(format!("{kind_prefix}-{suffix}")));
    }
    if is_blank(entity.get(CREATED_AT)) {
        entity.insert(CREATED_AT.to_string(), Value::from(timestamp(Utc::now())));
    }
    if is_blank(entity.get(UPDATED_AT)) {
        let created_at = entity.get(CREATED_AT).cloned().unwrap_or(Value::Null);
        entity.insert(UPDATED_AT.to_string(), created_at);
    }
    if is_blank(entity.get(VERSION)) {
        entity.insert(VERSION.to_string(), Value::from(1u64));
    }
    entity
}

/// Mark an entity as possibly changed at `at`.
pub fn touch<'a>(entity: &'a mut Object, kind_prefix: &str, at: DateTime<Utc>) -> &'a mut Object {
    ensure(entity, kind_prefix);
    let next = version_number(entity).unwrap_or(1).saturating_add(1);
    entity.insert(VERSION.to_string(), Value::from(next));
    entity.insert(UPDATED_AT.to_string(), Value::from(timestamp(at)));
    entity
}

/// A value takes part in version comparison when it is an object with both `version` and `updatedAt`.
pub fn is_versioned(value: &Value) -> bool {
    value.as_object().is_some_and(is_versioned_object)
}

pub(crate) fn is_versioned_object(object: &Object) -> bool {
    !object.get(VERSION).is_none_or(Value::is_null)
        && !object.get(UPDATED_AT).is_none_or(Value::is_null)
}

/// Pick the winner between two versioned values.
///
/// The higher `version` wins. On equal versions the later (or equal) `updatedAt` wins, so an exact tie
/// goes to `base`. If only one side is present, it wins.
pub fn compare_versioned<'a>(
    base: Option<&'a Value>,
    incoming: Option<&'a Value>,
) -> Option<&'a Value> {
    match (base, incoming) {
        (Some(base), Some(incoming)) => match (base.as_object(), incoming.as_object()) {
            (Some(b), Some(i)) if !base_wins(b, i) => Some(incoming),
            (None, Some(_)) => Some(incoming),
            _ => Some(base),
        },
        (Some(base), None) => Some(base),
        (None, incoming) => incoming,
    }
}

pub(crate) fn base_wins(base: &Object, incoming: &Object) -> bool {
    let base_version = raw_version(base);
    let incoming_version = raw_version(incoming);
    if base_version != incoming_version {
        return base_version > incoming_version;
    }
    compare_updated_at(base.get(UPDATED_AT), incoming.get(UPDATED_AT)) != Ordering::Less
}

fn raw_version(object: &Object) -> f64 {
    match object.get(VERSION) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// The version as a positive integer, if it is one.
fn version_number(object: &Object) -> Option<u64> {
    match object.get(VERSION)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v >= 1.0).map(|v| v as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v| *v >= 1)
}

fn compare_updated_at(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let parse = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    };
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        // Fall back to comparing the raw text when either side is not a timestamp we understand.
        _ => as_text(a).cmp(&as_text(b)),
    }
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn object(value: Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn ensure_fills_missing_metadata() {
        let mut entity = object(json!({"bearing": "N 45 E"}));
        ensure(&mut entity, "call");

        assert!(entity["id"].as_str().unwrap().starts_with("call-"));
        assert_eq!(entity["updatedAt"], entity["createdAt"]);
        assert_eq!(entity["version"], json!(1));
        assert_eq!(entity["bearing"], json!("N 45 E"));
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut entity = object(json!({}));
        ensure(&mut entity, "record");
        let first = entity.clone();
        ensure(&mut entity, "record");
        assert_eq!(entity, first);
    }

    #[test]
    fn ensure_never_overwrites_populated_fields() {
        let mut entity = object(json!({
            "id": "p1",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-02-01T00:00:00Z",
            "version": 7
        }));
        let before = entity.clone();
        ensure(&mut entity, "project");
        assert_eq!(entity, before);
    }

    #[test]
    fn ensure_leaves_unusual_versions_alone() {
        for version in [json!(0), json!(-1), json!(0.5), json!("3")] {
            let mut entity = object(json!({"id": "p1", "version": version.clone()}));
            ensure(&mut entity, "project");
            assert_eq!(entity["version"], version);
        }

        // A touch still bumps from whatever positive integer it can find, or from 1.
        let mut entity = object(json!({"id": "p1", "version": 0}));
        touch(&mut entity, "project", Utc::now());
        assert_eq!(entity["version"], json!(2));
    }

    #[test]
    fn touch_bumps_version_and_restamps() {
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap();
        let mut entity = object(json!({"id": "p1", "createdAt": "2024-01-01T00:00:00Z", "version": 2}));
        touch(&mut entity, "project", at);

        assert_eq!(entity["version"], json!(3));
        assert_eq!(entity["updatedAt"], json!("2024-03-04T05:06:07.000Z"));
        assert_eq!(entity["createdAt"], json!("2024-01-01T00:00:00Z"));
        assert_eq!(entity["id"], json!("p1"));
    }

    #[test]
    fn touch_on_fresh_entity_goes_to_version_two() {
        let mut entity = object(json!({}));
        touch(&mut entity, "tie", Utc::now());
        assert_eq!(entity["version"], json!(2));
    }

    #[test]
    fn higher_version_wins_regardless_of_timestamp() {
        let a = json!({"version": 2, "updatedAt": "2020-01-01T00:00:00Z"});
        let b = json!({"version": 1, "updatedAt": "2030-01-01T00:00:00Z"});
        assert_eq!(compare_versioned(Some(&a), Some(&b)), Some(&a));
        assert_eq!(compare_versioned(Some(&b), Some(&a)), Some(&a));
    }

    #[test]
    fn later_timestamp_wins_on_equal_versions() {
        let a = json!({"version": 1, "updatedAt": "2024-01-01T00:00:00Z"});
        let b = json!({"version": 1, "updatedAt": "2024-01-02T00:00:00Z"});
        assert_eq!(compare_versioned(Some(&a), Some(&b)), Some(&b));
    }

    #[test]
    fn timestamps_compare_as_instants() {
        // Same instant written two ways is a tie, so base wins.
        let a = json!({"id": "a", "version": 1, "updatedAt": "2024-01-01T00:00:00Z"});
        let b = json!({"id": "b", "version": 1, "updatedAt": "2024-01-01T00:00:00.000Z"});
        assert_eq!(compare_versioned(Some(&a), Some(&b)), Some(&a));
        assert_eq!(compare_versioned(Some(&b), Some(&a)), Some(&b));
    }

    #[test]
    fn present_side_wins_when_other_is_missing() {
        let a = json!({"version": 1, "updatedAt": "T"});
        assert_eq!(compare_versioned(Some(&a), None), Some(&a));
        assert_eq!(compare_versioned(None, Some(&a)), Some(&a));
        assert_eq!(compare_versioned(None, None), None);
    }
}
