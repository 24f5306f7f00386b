use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// A JSON object. Key order is preserved so that merges are deterministic.
pub type Object = Map<String, Value>;

/// The whole shared state of a user: every project, the corner evidence filed under each project,
/// and the global settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// project id -> project
    #[serde(default, deserialize_with = "null_as_default")]
    pub projects: IndexMap<String, Object>,
    /// project id -> corner evidence for that project
    #[serde(default, deserialize_with = "null_as_default")]
    pub evidence: IndexMap<String, Vec<Value>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub global_settings: Object,
    /// Top-level keys this version does not know about. They are merged like any other value
    /// so that newer clients don't lose data by talking to an older authority.
    #[serde(flatten)]
    pub other: Object,
}

impl Dataset {
    /// Parse an incoming payload, rejecting anything that is not shaped like a dataset.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(Error::InvalidPayload)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(Error::InvalidPayload)
    }

    pub fn to_value(&self) -> Value {
        // Serializing a tree of `Value`s with string keys cannot fail.
        serde_json::to_value(self).unwrap_or_else(|e| {
            log::error!("Failed to serialize dataset: {e:?}");
            Value::Null
        })
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
            && self.evidence.is_empty()
            && self.global_settings.is_empty()
            && self.other.is_empty()
    }

    pub fn project(&self, id: &str) -> Option<&Object> {
        self.projects.get(id)
    }

    pub fn project_mut(&mut self, id: &str) -> Option<&mut Object> {
        self.projects.get_mut(id)
    }

    /// The evidence list for a project, creating an empty one if needed.
    pub fn evidence_mut(&mut self, project_id: &str) -> &mut Vec<Value> {
        self.evidence.entry(project_id.to_string()).or_default()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
