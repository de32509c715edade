use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub queue_depth: usize,
    pub workers: usize,
    /// Whether a platform session token has been obtained yet.
    pub authenticated: bool,
}

/// GET /health — service liveness plus queue visibility.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        queue_depth: state.queue.len(),
        workers: state.config.workers_count,
        authenticated: state.tokens.authorization().await.is_some(),
    })
}
