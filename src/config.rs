//! Configuration loader for the `greenhouse-telemetry` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Parsing goes through a lookup function so the
//! rules can be exercised without touching the process environment.
//!
use std::env;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use crate::convert::SoilCalibration;
use crate::metrics::{IdealRange, IdealRanges};
use crate::normalize::{NormalizeSettings, PhMethod};

/// Parse an optional environment variable with a default value.
macro_rules! parse_env {
    ($get:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $get($var_name)
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($get:expr, $var_name:expr) => {
        $get($var_name).ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string for dismissal records; in-memory when unset.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Backend base URLs, tried in order.
    pub api_urls: Vec<String>,

    /// User whose devices are listed.
    pub user_id: u32,

    /// Explicit sensor addresses; empty means "whatever the resolver finds".
    pub sensor_addresses: Vec<String>,

    pub telemetry_window_secs: u32,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
    pub history_len: usize,
    pub dismissal_max_age: chrono::Duration,
    pub ph_method: PhMethod,
    pub soil: SoilCalibration,
    pub ranges: IdealRanges,
    pub listen_port: u16,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `SENSOR_API_URLS` – comma-separated backend base URLs
///
/// Optional:
/// - `DATABASE_URL` – PostgreSQL connection string (default: in-memory store)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BACKEND_USER_ID` (default: 1), `SENSOR_ADDRESSES` (default: resolved)
/// - `TELEMETRY_WINDOW_SECS` (1), `REFRESH_INTERVAL_SECS` (30),
///   `REQUEST_TIMEOUT_SECS` (8), `HISTORY_LEN` (100),
///   `DISMISSAL_MAX_AGE_DAYS` (7)
/// - `PH_METHOD` – `multi_factor` or `ec` (default: `multi_factor`)
/// - `SOIL_DRY_REF` / `SOIL_WET_REF` (2800 / 1300)
/// - `IDEAL_<METRIC>` – `min,max` overrides
/// - `LISTEN_PORT` (8080)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    Config::from_lookup(|key| env::var(key).ok())
}

impl Config {
    // ---
    pub fn from_lookup<F>(get: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        // ---
        let api_urls = parse_list(&require_env!(get, "SENSOR_API_URLS"));
        if api_urls.is_empty() {
            bail!("SENSOR_API_URLS must list at least one URL");
        }

        let db_url = get("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let db_pool_max = parse_env!(get, "DB_POOL_MAX", u32, 5);
        let user_id = parse_env!(get, "BACKEND_USER_ID", u32, 1);
        let sensor_addresses = get("SENSOR_ADDRESSES")
            .map(|v| parse_list(&v))
            .unwrap_or_default();

        let telemetry_window_secs = parse_env!(get, "TELEMETRY_WINDOW_SECS", u32, 1);
        let refresh_secs = parse_env!(get, "REFRESH_INTERVAL_SECS", u64, 30);
        if refresh_secs == 0 {
            bail!("REFRESH_INTERVAL_SECS must be greater than zero");
        }
        let timeout_secs = parse_env!(get, "REQUEST_TIMEOUT_SECS", u64, 8);
        if timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }
        let history_len = parse_env!(get, "HISTORY_LEN", usize, 100);
        let max_age_days = parse_env!(get, "DISMISSAL_MAX_AGE_DAYS", i64, 7);
        if max_age_days <= 0 {
            bail!("DISMISSAL_MAX_AGE_DAYS must be greater than zero");
        }

        let ph_method = match get("PH_METHOD").as_deref().map(str::trim) {
            None | Some("") | Some("multi_factor") => PhMethod::MultiFactor,
            Some("ec") => PhMethod::Ec,
            Some(other) => bail!("Invalid PH_METHOD: {} (expected multi_factor or ec)", other),
        };

        let defaults = SoilCalibration::default();
        let soil = SoilCalibration {
            dry_ref: parse_env!(get, "SOIL_DRY_REF", f64, defaults.dry_ref),
            wet_ref: parse_env!(get, "SOIL_WET_REF", f64, defaults.wet_ref),
        };
        if !(soil.dry_ref > soil.wet_ref) {
            bail!(
                "SOIL_DRY_REF ({}) must be greater than SOIL_WET_REF ({})",
                soil.dry_ref,
                soil.wet_ref
            );
        }

        let default_ranges = IdealRanges::default();
        let ranges = IdealRanges {
            temperature: parse_range(&get, "IDEAL_TEMPERATURE", default_ranges.temperature)?,
            air_humidity: parse_range(&get, "IDEAL_AIR_HUMIDITY", default_ranges.air_humidity)?,
            soil_humidity: parse_range(&get, "IDEAL_SOIL_HUMIDITY", default_ranges.soil_humidity)?,
            soil_salinity: parse_range(&get, "IDEAL_SOIL_SALINITY", default_ranges.soil_salinity)?,
            soil_ph: parse_range(&get, "IDEAL_SOIL_PH", default_ranges.soil_ph)?,
        };

        let listen_port = parse_env!(get, "LISTEN_PORT", u16, 8080);

        Ok(Config {
            db_url,
            db_pool_max,
            api_urls,
            user_id,
            sensor_addresses,
            telemetry_window_secs,
            refresh_interval: Duration::from_secs(refresh_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            history_len,
            dismissal_max_age: chrono::Duration::days(max_age_days),
            ph_method,
            soil,
            ranges,
            listen_port,
        })
    }

    pub fn normalize_settings(&self) -> NormalizeSettings {
        NormalizeSettings {
            ranges: self.ranges.clone(),
            soil: self.soil,
            ph_method: self.ph_method,
            history_len: self.history_len,
            ..Default::default()
        }
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password while showing all configuration values
    /// that were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_db_url = self
            .db_url
            .as_deref()
            .map(mask_db_url)
            .unwrap_or_else(|| "(unset, in-memory dismissals)".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL           : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX            : {}", self.db_pool_max);
        tracing::info!("  SENSOR_API_URLS        : {}", self.api_urls.join(", "));
        tracing::info!("  BACKEND_USER_ID        : {}", self.user_id);
        tracing::info!("  SENSOR_ADDRESSES       : {:?}", self.sensor_addresses);
        tracing::info!("  TELEMETRY_WINDOW_SECS  : {}", self.telemetry_window_secs);
        tracing::info!("  REFRESH_INTERVAL_SECS  : {}", self.refresh_interval.as_secs());
        tracing::info!("  REQUEST_TIMEOUT_SECS   : {}", self.request_timeout.as_secs());
        tracing::info!("  HISTORY_LEN            : {}", self.history_len);
        tracing::info!("  DISMISSAL_MAX_AGE_DAYS : {}", self.dismissal_max_age.num_days());
        tracing::info!("  PH_METHOD              : {:?}", self.ph_method);
        tracing::info!("  SOIL_DRY/WET_REF       : {}/{}", self.soil.dry_ref, self.soil.wet_ref);
        tracing::info!("  LISTEN_PORT            : {}", self.listen_port);
    }
}

/// Mask the password in a connection URL: `user:pass@host` → `user:****@host`.
fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            // `postgres://host` has its only colon right before `//`
            if !db_url[colon_pos..].starts_with("://") {
                return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
            }
        }
    }
    db_url.to_string()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_range<F>(get: &F, var_name: &str, default: IdealRange) -> Result<IdealRange>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let Some(raw) = get(var_name) else {
        return Ok(default);
    };
    let bounds = parse_list(&raw)
        .iter()
        .map(|v| v.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("Invalid {}: {}", var_name, e))?;

    match bounds.as_slice() {
        [min, max] => {
            IdealRange::new(*min, *max).map_err(|e| anyhow!("Invalid {}: {}", var_name, e))
        }
        _ => Err(anyhow!("Invalid {}: expected `min,max`, got {:?}", var_name, raw)),
    }
}
