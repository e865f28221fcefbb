//! Wire models for the greenhouse backend.
//!
//! The backend is loose about types: numbers arrive as JSON numbers or as
//! numeric strings, flags as booleans, `0/1` or `"True"`. Every field decodes
//! leniently to `Option` so an absent or unparseable value stays absent.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

// ---

/// A device registered for a user, as returned by the device listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Device {
    // ---
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,

    #[serde(default, alias = "nombre")]
    pub name: Option<String>,

    #[serde(default, alias = "descripcion")]
    pub description: Option<String>,

    /// Stable hardware address, the long-lived identity of a sensor.
    #[serde(default, rename = "macAddress", alias = "macaddress", alias = "mac")]
    pub mac_address: Option<String>,

    /// Switch state.
    #[serde(default, rename = "estado", deserialize_with = "lenient_flag")]
    pub state: Option<bool>,

    #[serde(default, rename = "tipoDispositivo", alias = "tipo")]
    pub kind: Option<String>,

    #[serde(default, rename = "ubicacion", alias = "location")]
    pub location: Option<String>,
}

impl Device {
    // ---
    /// Trimmed, upper-cased hardware address, `None` when absent or blank.
    pub fn address(&self) -> Option<String> {
        // ---
        self.mac_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_ascii_uppercase)
    }

    /// Display name, falling back to an empty string.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// One telemetry response for a single sensor address.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTelemetrySample {
    // ---
    #[serde(default, rename = "idsensor", deserialize_with = "lenient_string")]
    pub sensor_id: Option<String>,

    /// Measurement time as reported by the backend.
    #[serde(default, rename = "fecha", deserialize_with = "lenient_timestamp")]
    pub measured_at: Option<DateTime<Utc>>,

    #[serde(default, rename = "temperatura", deserialize_with = "lenient_f64")]
    pub temperature_c: Option<f64>,

    #[serde(default, rename = "humedad", deserialize_with = "lenient_f64")]
    pub air_humidity: Option<f64>,

    /// Analog soil moisture reading.
    #[serde(default, rename = "humedadSuelo", deserialize_with = "lenient_f64")]
    pub soil_moisture_raw: Option<f64>,

    /// Analog conductivity reading.
    #[serde(default, rename = "salinidadSuelo", deserialize_with = "lenient_f64")]
    pub salinity_raw: Option<f64>,

    /// Direct pH reading, only present on sensors that have one.
    #[serde(
        default,
        rename = "ph",
        alias = "pH",
        alias = "phSuelo",
        deserialize_with = "lenient_f64"
    )]
    pub ph: Option<f64>,

    #[serde(default, rename = "ledAzul", deserialize_with = "lenient_flag")]
    pub blue_led: Option<bool>,
}

// ---

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let raw = Value::deserialize(deserializer)?;
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|v| v.is_finite()))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    let raw = Value::deserialize(deserializer)?;
    let Value::String(s) = raw else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(s.trim()) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    // Backend local timestamps carry no offset; treat them as UTC.
    Ok(NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc()))
}
