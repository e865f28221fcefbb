//! Maps raw telemetry onto the per-sensor metric records.
//!
//! The batch is applied by address, so arrival order does not matter. A
//! sensor that failed or sent no data keeps its previous records untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::convert::{
    ph_from_ec, ph_from_multi_factor, salinity_to_ec, ConductivityCalibration, SoilCalibration,
    REFERENCE_TEMP_C,
};
use crate::fetcher::FetchedTelemetry;
use crate::metrics::{CalculationMethod, IdealRanges, MetricKind, SensorMetrics};
use crate::models::RawTelemetrySample;

// ---

/// The pH estimate used when a sensor has no direct pH reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhMethod {
    #[default]
    MultiFactor,
    Ec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeSettings {
    pub ranges: IdealRanges,
    pub soil: SoilCalibration,
    pub conductivity: ConductivityCalibration,
    pub ph_method: PhMethod,
    pub history_len: usize,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            ranges: IdealRanges::default(),
            soil: SoilCalibration::default(),
            conductivity: ConductivityCalibration::default(),
            ph_method: PhMethod::default(),
            history_len: 100,
        }
    }
}

/// Converted values for one sample, before they land in records.
#[derive(Debug, Clone, PartialEq)]
struct Converted {
    temperature: Option<f64>,
    air_humidity: Option<f64>,
    soil_humidity: Option<f64>,
    salinity: Option<f64>,
    ph: Option<f64>,
    ph_method: Option<CalculationMethod>,
}

fn convert_sample(sample: &RawTelemetrySample, settings: &NormalizeSettings) -> Converted {
    // ---
    let temperature = sample.temperature_c;
    let soil_humidity = sample.soil_moisture_raw.and_then(|raw| settings.soil.percent(raw));
    let salinity = sample.salinity_raw.and_then(|raw| {
        settings
            .conductivity
            .salinity_ppm(raw, temperature.unwrap_or(REFERENCE_TEMP_C))
    });

    let (ph, ph_method) = match sample.ph.filter(|ph| *ph > 0.0) {
        Some(direct) => (Some(direct), None),
        None => match settings.ph_method {
            PhMethod::MultiFactor => (
                salinity.zip(soil_humidity).and_then(|(s, m)| {
                    ph_from_multi_factor(s, m, temperature.unwrap_or(REFERENCE_TEMP_C))
                }),
                Some(CalculationMethod::MultiFactor),
            ),
            PhMethod::Ec => (
                salinity.and_then(|s| ph_from_ec(salinity_to_ec(s))),
                Some(CalculationMethod::ElectricalConductivity),
            ),
        },
    };

    Converted {
        temperature,
        air_humidity: sample.air_humidity,
        soil_humidity,
        salinity,
        ph,
        ph_method,
    }
}

/// Apply one fetch batch to the sensor map.
///
/// `now` stamps samples that carry no timestamp of their own. Addresses
/// without a sample get placeholder records only if they are new. Returns
/// the number of sensors whose records were updated.
pub fn apply_batch(
    sensors: &mut BTreeMap<String, SensorMetrics>,
    batch: &[FetchedTelemetry],
    settings: &NormalizeSettings,
    now: DateTime<Utc>,
) -> usize {
    // ---
    let mut updated = 0;

    for fetched in batch {
        let entry = sensors.entry(fetched.address.clone()).or_insert_with(|| {
            SensorMetrics::placeholder(&fetched.address, &settings.ranges, settings.history_len)
        });

        let Some(sample) = &fetched.sample else {
            continue;
        };

        let converted = convert_sample(sample, settings);
        let timestamp = sample.measured_at.unwrap_or(now);

        for (kind, value, method) in [
            (MetricKind::Temperature, converted.temperature, None),
            (MetricKind::AirHumidity, converted.air_humidity, None),
            (MetricKind::SoilHumidity, converted.soil_humidity, None),
            (MetricKind::SoilSalinity, converted.salinity, None),
            (MetricKind::SoilPh, converted.ph, converted.ph_method),
        ] {
            if let Some(record) = entry.metrics.get_mut(&kind) {
                record.update(value, timestamp, method);
            }
        }

        entry.blue_led = sample.blue_led;
        entry.last_seen = Some(timestamp);
        entry.refresh_levels();
        updated += 1;
    }
    updated
}
