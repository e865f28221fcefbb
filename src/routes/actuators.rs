//! Actuator board and switch control.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{error_response, AppState};
use crate::resolver::ActuatorCategory;

// ---

#[derive(Debug, Deserialize)]
struct SwitchRequest {
    on: bool,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/actuators", get(board))
        .route("/actuators/{category}", post(toggle))
}

async fn board(State(pipeline): State<AppState>) -> impl IntoResponse {
    Json(pipeline.actuators().await)
}

async fn toggle(
    Path(category): Path<String>,
    State(pipeline): State<AppState>,
    Json(request): Json<SwitchRequest>,
) -> axum::response::Response {
    // ---
    let Ok(category) = category.parse::<ActuatorCategory>() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown actuator category: {}", category) })),
        )
            .into_response();
    };

    info!("POST /actuators/{} on={}", category, request.on);
    match pipeline.set_actuator(category, request.on).await {
        Ok(state) => Json(state).into_response(),
        Err(e) => error_response(e),
    }
}
