#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("request to the authority failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authority rejected the payload: {0}")]
    Rejected(String),

    #[error("authority answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Dataset(#[from] reconcile::Error),

    #[error("the sync coordinator has shut down")]
    Shutdown,
}
