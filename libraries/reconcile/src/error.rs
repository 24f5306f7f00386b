use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("failed to {action} {}: {source}", path.display())]
    Storage {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored dataset at {} is not valid: {source}", path.display())]
    CorruptStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode dataset: {0}")]
    Encode(#[source] serde_json::Error),
}
