use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use super::{error_response, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/alerts", get(list_alerts))
        .route("/alerts/{key}/dismiss", post(dismiss))
}

async fn list_alerts(State(pipeline): State<AppState>) -> impl IntoResponse {
    Json(pipeline.alerts().await)
}

async fn dismiss(
    Path(key): Path<String>,
    State(pipeline): State<AppState>,
) -> axum::response::Response {
    // ---
    info!("POST /alerts/{}/dismiss", key);
    match pipeline.dismiss(&key).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => error_response(e),
    }
}
