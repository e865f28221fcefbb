// src/routes/health.rs
//! Liveness endpoint.
//!
//! `/health` answers as soon as the HTTP server is up. It never waits on the
//! backend, the refresh loop or the dismissal store; whether the greenhouse
//! backend is reachable is reported by `/status` instead.

use axum::{routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
}

async fn liveness() -> Json<Liveness> {
    Json(Liveness { status: "ok" })
}

/// `GET /health`, mergeable into a router of any state type.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(liveness))
}
