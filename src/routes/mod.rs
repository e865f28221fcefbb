use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json, Router};
use serde_json::json;
use tracing::warn;

use crate::pipeline::{Pipeline, PipelineError};

mod actuators;
mod alerts;
mod health;
mod sensors;

// ---

pub type AppState = Arc<Pipeline>;

pub fn router(pipeline: AppState) -> Router {
    // ---
    Router::new()
        .merge(sensors::router())
        .merge(alerts::router())
        .merge(actuators::router())
        .merge(health::router())
        .with_state(pipeline)
}

/// Map a pipeline failure to a status code and a JSON `{"error": ...}` body.
fn error_response(err: PipelineError) -> Response {
    // ---
    let status = match &err {
        PipelineError::NotActive { .. } => StatusCode::NOT_FOUND,
        PipelineError::ActuatorUnbound(_) => StatusCode::CONFLICT,
        PipelineError::Backend(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("{} - {}", status, err);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::testing::{greenhouse_pipeline, pipeline_settings, spawn_backend, MockGreenhouse};
    use reqwest::Client;
    use serde_json::Value;
    use std::sync::atomic::Ordering;

    async fn serve() -> (String, MockGreenhouse) {
        // ---
        let (pipeline, mock) = greenhouse_pipeline(pipeline_settings()).await;
        pipeline.run_cycle().await;
        (spawn_backend(router(Arc::new(pipeline))).await, mock)
    }

    async fn get_json(url: String) -> Value {
        reqwest::get(url).await.unwrap().json().await.unwrap()
    }

    async fn switch(base: &str, category: &str, on: bool) -> reqwest::Response {
        Client::new()
            .post(format!("{}/actuators/{}", base, category))
            .json(&json!({ "on": on }))
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sensor_and_status_routes() {
        // ---
        let (base, _) = serve().await;

        let sensors: Value = get_json(format!("{}/sensors", base)).await;
        assert_eq!(sensors["AA"]["metrics"]["temperature"]["value"], json!(35.0));

        let status: Value = get_json(format!("{}/status", base)).await;
        assert_eq!(status["connectivity"], "online");
        assert_eq!(status["applied_cycle"], 1);

        let report: Value = Client::new()
            .post(format!("{}/refresh", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["cycle"], 2);
        assert_eq!(report["applied"], true);
    }

    #[tokio::test]
    async fn test_dismiss_status_codes() {
        // ---
        let (base, _) = serve().await;
        let client = Client::new();

        let view: Value = get_json(format!("{}/alerts", base)).await;
        let key = view["alerts"][0]["key"].as_str().unwrap().to_string();

        let url = format!("{}/alerts/{}/dismiss", base, key);
        let first = client.post(&url).send().await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let record: Value = first.json().await.unwrap();
        assert_eq!(record["count"], 1);

        let again = client.post(&url).send().await.unwrap();
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
        let body: Value = again.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains(&key));

        let unknown = client
            .post(format!("{}/alerts/deadbeef/dismiss", base))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_actuator_status_codes() {
        // ---
        let (base, mock) = serve().await;

        assert_eq!(switch(&base, "sprinklers", true).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(switch(&base, "heating", true).await.status(), StatusCode::CONFLICT);

        mock.fail_switch.store(true, Ordering::SeqCst);
        assert_eq!(switch(&base, "irrigation", true).await.status(), StatusCode::BAD_GATEWAY);

        mock.fail_switch.store(false, Ordering::SeqCst);
        let ok = switch(&base, "irrigation", true).await;
        assert_eq!(ok.status(), StatusCode::OK);
        let state: Value = ok.json().await.unwrap();
        assert_eq!(state["is_active"], true);
        assert_eq!(state["device"]["id"], 10);

        let board: Value = get_json(format!("{}/actuators", base)).await;
        assert_eq!(board["irrigation"]["is_active"], true);
        assert_eq!(board["heating"]["device"], Value::Null);
    }
}
