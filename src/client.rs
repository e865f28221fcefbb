//! REST client for the greenhouse backend.
//!
//! The backend may be reachable at several base URLs. The client keeps the
//! last URL that answered as the preferred endpoint, tries it first on every
//! request, and falls back through the configured list in order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{Device, RawTelemetrySample};

// ---

const DEVICES_PATH: &str = "/ControllerDHT11/GetDispositivosForUser";
const TELEMETRY_PATH: &str = "/ControllerDHT11/GetTemperaturaSegundos";
const SWITCH_PATH: &str = "/ControllerSwitch/SetSwitch";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no backend endpoints configured")]
    NoEndpoints,

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: StatusCode },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid response body from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Sticky endpoint selection over a fixed list of base URLs.
#[derive(Debug)]
pub struct EndpointSelector {
    urls: Vec<String>,
    preferred: AtomicUsize,
}

impl EndpointSelector {
    // ---
    pub fn new(urls: Vec<String>) -> Self {
        // ---
        let urls = urls
            .into_iter()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .collect();
        Self {
            urls,
            preferred: AtomicUsize::new(0),
        }
    }

    /// Endpoint indices in try order: preferred first, then the rest.
    pub fn order(&self) -> Vec<usize> {
        // ---
        let preferred = self.preferred.load(Ordering::Relaxed);
        let mut order = Vec::with_capacity(self.urls.len());
        if preferred < self.urls.len() {
            order.push(preferred);
        }
        order.extend((0..self.urls.len()).filter(|&i| i != preferred));
        order
    }

    pub fn url(&self, index: usize) -> Option<&str> {
        self.urls.get(index).map(String::as_str)
    }

    pub fn mark_good(&self, index: usize) {
        // ---
        let previous = self.preferred.swap(index, Ordering::Relaxed);
        if previous != index {
            if let Some(url) = self.url(index) {
                tracing::info!("Preferred backend endpoint is now {}", url);
            }
        }
    }

    pub fn preferred_url(&self) -> Option<&str> {
        self.url(self.preferred.load(Ordering::Relaxed))
    }
}

/// Cloneable handle to the backend; clones share the endpoint preference.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    endpoints: Arc<EndpointSelector>,
}

impl BackendClient {
    // ---
    pub fn new(urls: Vec<String>, timeout: Duration) -> anyhow::Result<Self> {
        // ---
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoints: Arc::new(EndpointSelector::new(urls)),
        })
    }

    pub fn endpoints(&self) -> &EndpointSelector {
        &self.endpoints
    }

    /// Send a request to the first endpoint that answers with a success
    /// status, returning the response body as text.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(String, String), BackendError> {
        // ---
        let mut last_error = BackendError::NoEndpoints;

        for index in self.endpoints.order() {
            let Some(base) = self.endpoints.url(index) else {
                continue;
            };
            let url = format!("{}{}", base, path);
            debug!("{} {} {:?}", method, url, query);

            let response = match self
                .http
                .request(method.clone(), &url)
                .header("accept", "*/*")
                .query(query)
                .send()
                .await
            {
                Ok(response) => response,
                Err(source) => {
                    debug!("Endpoint {} unreachable: {}", base, source);
                    last_error = BackendError::Transport { url, source };
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                debug!("Endpoint {} answered {}", base, status);
                last_error = BackendError::Http { url, status };
                continue;
            }

            self.endpoints.mark_good(index);
            return match response.text().await {
                Ok(body) => Ok((url, body)),
                Err(source) => Err(BackendError::Transport { url, source }),
            };
        }
        Err(last_error)
    }

    /// List the devices registered for a user. Entries that do not decode
    /// are skipped.
    pub async fn get_devices(&self, user_id: u32) -> Result<Vec<Device>, BackendError> {
        // ---
        let (url, body) = self
            .request(Method::GET, DEVICES_PATH, &[("user", user_id.to_string())])
            .await?;

        let parsed: Value = serde_json::from_str(&body).map_err(|e| BackendError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let Some(items) = parsed.as_array() else {
            warn!("Device listing from {} is not an array", url);
            return Ok(Vec::new());
        };

        let mut devices = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match serde_json::from_value::<Device>(item.clone()) {
                Ok(device) => devices.push(device),
                Err(e) => debug!("Failed to parse device {}: {} - Raw item: {}", i, e, item),
            }
        }
        debug!("Fetched {} devices for user {}", devices.len(), user_id);
        Ok(devices)
    }

    /// Latest telemetry for one sensor address.
    ///
    /// An empty, `null` or non-JSON body means "no data this cycle" and
    /// yields `Ok(None)`. When the body is an array the last sample is used.
    pub async fn get_telemetry(
        &self,
        address: &str,
        window_secs: u32,
    ) -> Result<Option<RawTelemetrySample>, BackendError> {
        // ---
        let (url, body) = self
            .request(
                Method::GET,
                TELEMETRY_PATH,
                &[
                    ("segundos", window_secs.to_string()),
                    ("idSensor", address.to_string()),
                ],
            )
            .await?;
        Ok(parse_telemetry_body(address, &url, &body))
    }

    /// Switch an actuator on or off. Returns the backend's JSON answer, or
    /// `Value::Null` when it sends none.
    pub async fn set_switch(&self, switch_id: i64, on: bool) -> Result<Value, BackendError> {
        // ---
        let state = if on { "1" } else { "0" };
        let (_, body) = self
            .request(
                Method::POST,
                SWITCH_PATH,
                &[("id", switch_id.to_string()), ("estado", state.to_string())],
            )
            .await?;
        tracing::info!("Switch {} set to {}", switch_id, state);
        Ok(serde_json::from_str(&body).unwrap_or(Value::Null))
    }
}

fn parse_telemetry_body(address: &str, url: &str, body: &str) -> Option<RawTelemetrySample> {
    // ---
    if body.trim().is_empty() {
        warn!("Empty telemetry body for sensor {}", address);
        return None;
    }
    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Non-JSON telemetry for sensor {} from {}: {}", address, url, e);
            return None;
        }
    };
    let item = match parsed {
        Value::Array(mut items) => items.pop()?,
        Value::Object(map) => Value::Object(map),
        _ => {
            debug!("Telemetry for sensor {} carries no sample", address);
            return None;
        }
    };
    match serde_json::from_value::<RawTelemetrySample>(item) {
        Ok(sample) => Some(sample),
        Err(e) => {
            warn!("Telemetry for sensor {} did not decode: {}", address, e);
            None
        }
    }
}
