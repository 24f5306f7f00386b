use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    response::{
        IntoResponse,
        sse::{KeepAlive, Sse},
    },
    routing::{get, post},
};
use reconcile::Dataset;
use reconcile::protocol::{DATASET_PATH, EVENTS_PATH, SYNC_PATH};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::authority::Authority;
use crate::broadcast::dataset_events;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub authority: Arc<Authority>,
    pub keepalive: Duration,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/", get(|| async { "survey sync authority" }))
        .route(SYNC_PATH, post(sync))
        .route(EVENTS_PATH, get(events))
        .route(DATASET_PATH, get(dataset))
        // The default compression predicate leaves `text/event-stream` alone.
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Parse the body ourselves rather than through `Json`, so that every malformed payload
/// gets the same "invalid payload" answer and never reaches the store.
async fn sync(State(state): State<AppState>, body: Bytes) -> Result<Json<Dataset>, AppError> {
    let incoming = Dataset::from_slice(&body).map_err(AppError::InvalidPayload)?;
    let merged = state.authority.reconcile(incoming).await?;
    Ok(Json(Dataset::clone(&merged)))
}

async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let stream = dataset_events(Arc::clone(&state.authority)).await;
    Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keepalive).text("ping"))
}

async fn dataset(State(state): State<AppState>) -> Json<Dataset> {
    Json(Dataset::clone(&*state.authority.current().await))
}
