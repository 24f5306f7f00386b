use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use reconcile::protocol::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    InvalidPayload(reconcile::Error),

    #[error("failed to save dataset: {0}")]
    SaveFailed(#[source] reconcile::Error),

    #[error("storage task failed: {0}")]
    StorageTask(#[from] tokio::task::JoinError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            AppError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "invalid payload"),
            AppError::SaveFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "save failed"),
            AppError::StorageTask(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        };
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::warn!("Rejected request: {self}");
        }
        let body = ErrorBody {
            error: error.to_string(),
            detail: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
