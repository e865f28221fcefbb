//! End-to-end checks against a running service.
//!
//! Start the service against a reachable backend, then run
//! `cargo test -- --ignored` (optionally with `BASE_URL`).

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct IdealRange {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct MetricRecord {
    value: Option<f64>,
    unit: String,
    ideal_range: IdealRange,
    source_address: String,
    is_real: bool,
    is_calculated: bool,
    status: String,
    history: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct SensorSnapshot {
    address: String,
    metrics: BTreeMap<String, MetricRecord>,
}

#[derive(Debug, Deserialize)]
struct Alert {
    key: String,
    #[serde(rename = "type")]
    alert_type: String,
    sensor_key: String,
    message: String,
    timestamp: DateTime<Utc>,
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct AlertsView {
    alerts: Vec<Alert>,
    suggestions: Vec<String>,
}

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into())
}

#[tokio::test]
#[ignore = "requires a running service"]
async fn health_and_status() -> Result<()> {
    // ---
    let client = Client::new();

    let health: Value = client.get(format!("{}/health", base_url())).send().await?.json().await?;
    assert_eq!(health, json!({ "status": "ok" }));

    let status: Value = client.get(format!("{}/status", base_url())).send().await?.json().await?;
    let connectivity = status["connectivity"].as_str().unwrap_or_default();
    assert!(
        ["online", "degraded", "offline"].contains(&connectivity),
        "unexpected connectivity {:?}",
        connectivity
    );
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running service"]
async fn refreshed_sensors_are_consistent() -> Result<()> {
    // ---
    let client = Client::new();
    let report: Value = client
        .post(format!("{}/refresh", base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert!(report["cycle"].as_u64().is_some(), "no cycle id in {}", report);

    let sensors: BTreeMap<String, SensorSnapshot> = client
        .get(format!("{}/sensors", base_url()))
        .send()
        .await?
        .json()
        .await?;

    for (address, sensor) in &sensors {
        // ---
        assert_eq!(address, &sensor.address);
        assert_eq!(sensor.metrics.len(), 5, "{} should carry all five metrics", address);

        for (kind, record) in &sensor.metrics {
            assert_eq!(&record.source_address, address);
            assert!(!record.unit.is_empty());
            assert!(record.ideal_range.min <= record.ideal_range.max);

            // Absent values are never reported as real readings
            if record.value.is_none() {
                assert!(!record.is_real, "{}:{} is null but marked real", address, kind);
                assert_eq!(record.status, "inactive");
            }
            if record.is_calculated {
                assert_eq!(kind, "soilPH");
            }
            assert!(record.history.len() <= 100);
        }
    }
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running service"]
async fn dismissed_alert_stays_hidden() -> Result<()> {
    // ---
    let client = Client::new();
    let view: AlertsView = client.get(format!("{}/alerts", base_url())).send().await?.json().await?;

    for alert in &view.alerts {
        assert!(alert.is_active);
        assert!(["warning", "critical"].contains(&alert.alert_type.as_str()));
        assert!(alert.sensor_key.contains(':'));
        assert!(!alert.message.is_empty());
        assert!(alert.timestamp > DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default());
    }
    assert!(view.suggestions.iter().all(|s| !s.is_empty()));

    let Some(first) = view.alerts.first() else {
        return Ok(());
    };

    let url = format!("{}/alerts/{}/dismiss", base_url(), first.key);
    assert_eq!(client.post(&url).send().await?.status(), StatusCode::OK);
    assert_eq!(client.post(&url).send().await?.status(), StatusCode::NOT_FOUND);

    client.post(format!("{}/refresh", base_url())).send().await?;
    let after: AlertsView = client
        .get(format!("{}/alerts", base_url()))
        .send()
        .await?
        .json()
        .await?;
    assert!(after.alerts.iter().all(|a| a.key != first.key));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running service"]
async fn unknown_actuator_category_is_not_found() -> Result<()> {
    // ---
    let client = Client::new();
    let response = client
        .post(format!("{}/actuators/sprinklers", base_url()))
        .json(&json!({ "on": true }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let board: Value = client.get(format!("{}/actuators", base_url())).send().await?.json().await?;
    for category in ["irrigation", "ventilation", "lighting", "heating", "windows"] {
        assert!(board.get(category).is_some(), "missing {}", category);
    }
    Ok(())
}
