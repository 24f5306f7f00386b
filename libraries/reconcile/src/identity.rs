//! How members of an ordered list are matched up between two copies of the list.

use serde_json::Value;

/// Fields that tell two calls (or ties) apart when neither has an id or a point number.
pub const SIGNATURE_FIELDS: [&str; 8] = [
    "bearing",
    "distance",
    "radius",
    "arcLength",
    "chordBearing",
    "chordLength",
    "delta",
    "curveDirection",
];

/// The identity of a list member. Each variant is its own namespace, so an id can never
/// collide with a point number that happens to be spelled the same way.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberKey {
    Id(String),
    PointNumber(String),
    Signature(String),
    Raw(String),
}

/// Key a list member by, in order: its `id`, its `pointNumber`, a signature over its distinguishing
/// fields, or failing all of those, its full serialized form.
///
/// The fallbacks let two devices that each typed in the same call from a paper note end up with one
/// call after merging instead of two.
pub fn member_key(member: &Value) -> MemberKey {
    let Some(object) = member.as_object() else {
        return MemberKey::Raw(member.to_string());
    };

    if let Some(id) = object.get("id").and_then(key_text) {
        return MemberKey::Id(id);
    }
    if let Some(point_number) = object.get("pointNumber").and_then(key_text) {
        return MemberKey::PointNumber(point_number);
    }
    if SIGNATURE_FIELDS.iter().any(|field| object.contains_key(*field)) {
        let signature: Vec<Value> = SIGNATURE_FIELDS
            .iter()
            .map(|field| object.get(*field).cloned().unwrap_or(Value::Null))
            .collect();
        return MemberKey::Signature(Value::Array(signature).to_string());
    }
    MemberKey::Raw(member.to_string())
}

/// Point numbers are typed into forms, so `12` and `"12"` are the same point.
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_takes_priority() {
        let member = json!({"id": "c1", "pointNumber": 4, "bearing": "N"});
        assert_eq!(member_key(&member), MemberKey::Id("c1".into()));
    }

    #[test]
    fn point_number_is_next() {
        assert_eq!(
            member_key(&json!({"pointNumber": 12, "x": 1.0})),
            member_key(&json!({"pointNumber": "12", "x": 2.0})),
        );
    }

    #[test]
    fn empty_id_falls_through() {
        let member = json!({"id": "", "pointNumber": "7"});
        assert_eq!(member_key(&member), MemberKey::PointNumber("7".into()));
    }

    #[test]
    fn signature_ignores_non_distinguishing_fields() {
        let a = json!({"bearing": "N 10 E", "distance": 100.0, "note": "from paper"});
        let b = json!({"bearing": "N 10 E", "distance": 100.0, "note": "typed twice"});
        assert_eq!(member_key(&a), member_key(&b));

        let c = json!({"bearing": "N 10 E", "distance": 100.5});
        assert_ne!(member_key(&a), member_key(&c));
    }

    #[test]
    fn curve_parameters_distinguish_calls() {
        let a = json!({"bearing": "N 10 E", "distance": 100.0, "radius": 50.0});
        let b = json!({"bearing": "N 10 E", "distance": 100.0, "radius": 75.0});
        assert_ne!(member_key(&a), member_key(&b));
    }

    #[test]
    fn everything_else_keys_on_serialized_form() {
        assert_eq!(
            member_key(&json!({"label": "fence"})),
            MemberKey::Raw(r#"{"label":"fence"}"#.into())
        );
        assert_eq!(member_key(&json!(3)), MemberKey::Raw("3".into()));
    }
}
