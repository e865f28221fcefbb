//! Test helpers: an in-process mock of the greenhouse backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Duration;
use serde_json::json;

use crate::client::BackendClient;
use crate::normalize::NormalizeSettings;
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::store::DismissalStore;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_backend(router: Router) -> String {
    // ---
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("mock backend address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

// ---

/// Switches for the mock greenhouse; flip them between cycles.
///
/// The listing has sensors `AA` (35 °C, warning), `BB` (22 °C) and
/// `CC` (10 °C, critical), an irrigation switch with id 10 and one
/// unmapped device.
#[derive(Clone, Default)]
pub struct MockGreenhouse {
    pub fail_devices: Arc<AtomicBool>,
    pub fail_bb: Arc<AtomicBool>,
    pub unlist_bb: Arc<AtomicBool>,
    pub fail_switch: Arc<AtomicBool>,
}

async fn devices(State(mock): State<MockGreenhouse>) -> axum::response::Response {
    // ---
    if mock.fail_devices.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let mut listing = vec![
        json!({ "id": 1, "nombre": "Sensor invernadero A", "macAddress": "AA" }),
        json!({ "id": 2, "nombre": "Sensor B", "macAddress": "BB" }),
        json!({ "id": 3, "nombre": "Sensor C", "macAddress": "CC" }),
        json!({ "id": 10, "nombre": "Switch riego", "estado": 0 }),
        json!({ "id": 11, "nombre": "Cámara" }),
    ];
    if mock.unlist_bb.load(Ordering::SeqCst) {
        listing.retain(|d| d["macAddress"] != "BB");
    }
    Json(listing).into_response()
}

async fn telemetry(
    State(mock): State<MockGreenhouse>,
    Query(q): Query<HashMap<String, String>>,
) -> axum::response::Response {
    // ---
    match q.get("idSensor").map(String::as_str) {
        Some("AA") => Json(json!({
            "idsensor": "AA",
            "temperatura": 35.0,
            "humedad": 60,
            "humedadSuelo": "2050",
            "salinidadSuelo": 100
        }))
        .into_response(),
        Some("BB") if mock.fail_bb.load(Ordering::SeqCst) => {
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Some("BB") => Json(json!({ "idsensor": "BB", "temperatura": 22.0 })).into_response(),
        Some("CC") => Json(json!({ "idsensor": "CC", "temperatura": 10.0 })).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn set_switch(State(mock): State<MockGreenhouse>) -> axum::response::Response {
    if mock.fail_switch.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({ "ok": true })).into_response()
}

/// Start the mock greenhouse and return its base URL with its switches.
pub async fn spawn_greenhouse() -> (String, MockGreenhouse) {
    // ---
    let mock = MockGreenhouse::default();
    let base = spawn_backend(
        Router::new()
            .route("/ControllerDHT11/GetDispositivosForUser", get(devices))
            .route("/ControllerDHT11/GetTemperaturaSegundos", get(telemetry))
            .route("/ControllerSwitch/SetSwitch", post(set_switch))
            .with_state(mock.clone()),
    )
    .await;
    (base, mock)
}

pub fn pipeline_settings() -> PipelineSettings {
    PipelineSettings {
        user_id: 1,
        window_secs: 1,
        configured_addresses: Vec::new(),
        dismissal_max_age: Duration::days(7),
        normalize: NormalizeSettings::default(),
    }
}

/// A pipeline with an in-memory store wired to a fresh mock greenhouse.
pub async fn greenhouse_pipeline(settings: PipelineSettings) -> (Pipeline, MockGreenhouse) {
    // ---
    let (base, mock) = spawn_greenhouse().await;
    let client = BackendClient::new(vec![base], std::time::Duration::from_secs(2))
        .expect("mock backend client");
    (
        Pipeline::new(client, DismissalStore::memory(), settings),
        mock,
    )
}
