//! What the authority and its clients agree on over the wire.

use serde::{Deserialize, Serialize};

/// `POST` a whole dataset, get the merged dataset back.
pub const SYNC_PATH: &str = "/api/sync";
/// Server-sent events carrying the authoritative dataset whenever it changes.
pub const EVENTS_PATH: &str = "/api/events";
/// `GET` the current authoritative dataset.
pub const DATASET_PATH: &str = "/api/dataset";

/// Name of the push event whose data is a JSON-encoded [`Dataset`](crate::Dataset).
pub const DATASET_EVENT: &str = "dataset";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
