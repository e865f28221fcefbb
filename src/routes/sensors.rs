//! Sensor snapshots, connectivity and manual refresh.

use axum::{extract::State, response::IntoResponse, routing::get, routing::post, Json, Router};
use tracing::info;

use super::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/sensors", get(list_sensors))
        .route("/status", get(status))
        .route("/refresh", post(refresh))
}

async fn list_sensors(State(pipeline): State<AppState>) -> impl IntoResponse {
    Json(pipeline.sensors().await)
}

async fn status(State(pipeline): State<AppState>) -> impl IntoResponse {
    Json(pipeline.status().await)
}

/// Run a cycle now. Concurrent with the refresh loop; the cycle-id guard
/// keeps the newest applied result.
async fn refresh(State(pipeline): State<AppState>) -> impl IntoResponse {
    // ---
    info!("POST /refresh - running cycle");
    Json(pipeline.run_cycle().await)
}
