//! Canonical per-metric records held for every sensor address.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::convert::{interpret_ph_level, interpret_salinity_level, PhLevel, SalinityLevel};

// ---

/// Physical quantities tracked per sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MetricKind {
    #[serde(rename = "temperature")]
    Temperature,
    #[serde(rename = "airHumidity")]
    AirHumidity,
    #[serde(rename = "soilHumidity")]
    SoilHumidity,
    #[serde(rename = "soilSalinity")]
    SoilSalinity,
    #[serde(rename = "soilPH")]
    SoilPh,
}

impl MetricKind {
    // ---
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Temperature,
        MetricKind::AirHumidity,
        MetricKind::SoilHumidity,
        MetricKind::SoilSalinity,
        MetricKind::SoilPh,
    ];

    pub fn key(self) -> &'static str {
        match self {
            MetricKind::Temperature => "temperature",
            MetricKind::AirHumidity => "airHumidity",
            MetricKind::SoilHumidity => "soilHumidity",
            MetricKind::SoilSalinity => "soilSalinity",
            MetricKind::SoilPh => "soilPH",
        }
    }

    /// Name used in alert messages.
    pub fn display_name(self) -> &'static str {
        match self {
            MetricKind::Temperature => "Temperatura",
            MetricKind::AirHumidity => "Humedad del aire",
            MetricKind::SoilHumidity => "Humedad del suelo",
            MetricKind::SoilSalinity => "Salinidad del suelo",
            MetricKind::SoilPh => "pH del suelo",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            MetricKind::Temperature => "°C",
            MetricKind::AirHumidity | MetricKind::SoilHumidity => "%",
            MetricKind::SoilSalinity => "ppm",
            MetricKind::SoilPh => "pH",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RangeError {
    #[error("ideal range bounds must be finite: {min}-{max}")]
    NotFinite { min: f64, max: f64 },

    #[error("ideal range min {min} is greater than max {max}")]
    Inverted { min: f64, max: f64 },
}

/// The healthy band for a metric. Always `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IdealRange {
    min: f64,
    max: f64,
}

impl IdealRange {
    // ---
    pub fn new(min: f64, max: f64) -> Result<Self, RangeError> {
        // ---
        if !min.is_finite() || !max.is_finite() {
            return Err(RangeError::NotFinite { min, max });
        }
        if min > max {
            return Err(RangeError::Inverted { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Ideal ranges for every metric kind.
#[derive(Debug, Clone, PartialEq)]
pub struct IdealRanges {
    pub temperature: IdealRange,
    pub air_humidity: IdealRange,
    pub soil_humidity: IdealRange,
    pub soil_salinity: IdealRange,
    pub soil_ph: IdealRange,
}

impl Default for IdealRanges {
    fn default() -> Self {
        Self {
            temperature: IdealRange { min: 18.0, max: 30.0 },
            air_humidity: IdealRange { min: 40.0, max: 80.0 },
            soil_humidity: IdealRange { min: 30.0, max: 70.0 },
            soil_salinity: IdealRange { min: 0.0, max: 800.0 },
            soil_ph: IdealRange { min: 6.0, max: 7.5 },
        }
    }
}

impl IdealRanges {
    pub fn get(&self, kind: MetricKind) -> IdealRange {
        match kind {
            MetricKind::Temperature => self.temperature,
            MetricKind::AirHumidity => self.air_humidity,
            MetricKind::SoilHumidity => self.soil_humidity,
            MetricKind::SoilSalinity => self.soil_salinity,
            MetricKind::SoilPh => self.soil_ph,
        }
    }
}

/// Health of a single value against its ideal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Optimal,
    Warning,
    Critical,
    /// No value to judge.
    Inactive,
}

/// Critical below 80 % of the minimum or above 120 % of the maximum,
/// warning anywhere else outside the range.
pub fn classify(value: Option<f64>, range: &IdealRange) -> MetricStatus {
    // ---
    let Some(v) = value else {
        return MetricStatus::Inactive;
    };
    if range.contains(v) {
        MetricStatus::Optimal
    } else if v < range.min * 0.8 || v > range.max * 1.2 {
        MetricStatus::Critical
    } else {
        MetricStatus::Warning
    }
}

/// How a derived value was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    MultiFactor,
    #[serde(rename = "ec")]
    ElectricalConductivity,
}

/// Current state of one physical quantity at one sensor address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    // ---
    pub kind: MetricKind,
    pub value: Option<f64>,
    pub unit: &'static str,
    pub ideal_range: IdealRange,
    pub source_address: String,
    pub timestamp: Option<DateTime<Utc>>,

    /// Backed by a live reading rather than a placeholder.
    pub is_real: bool,
    pub is_calculated: bool,
    pub calculation_method: Option<CalculationMethod>,
    pub status: MetricStatus,

    /// Past values, oldest first.
    pub history: VecDeque<f64>,

    #[serde(skip)]
    history_capacity: usize,
}

impl MetricRecord {
    // ---
    /// An empty record for an address that has not reported yet.
    pub fn placeholder(
        kind: MetricKind,
        address: &str,
        ideal_range: IdealRange,
        history_capacity: usize,
    ) -> Self {
        // ---
        Self {
            kind,
            value: None,
            unit: kind.unit(),
            ideal_range,
            source_address: address.to_string(),
            timestamp: None,
            is_real: false,
            is_calculated: false,
            calculation_method: None,
            status: MetricStatus::Inactive,
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
        }
    }

    /// Replace the current value. Present values are appended to the history.
    pub fn update(
        &mut self,
        value: Option<f64>,
        timestamp: DateTime<Utc>,
        calculation_method: Option<CalculationMethod>,
    ) {
        // ---
        self.value = value;
        self.timestamp = Some(timestamp);
        self.is_real = value.is_some();
        self.is_calculated = value.is_some() && calculation_method.is_some();
        self.calculation_method = if self.is_calculated {
            calculation_method
        } else {
            None
        };
        self.status = classify(value, &self.ideal_range);
        if let Some(v) = value {
            self.push_history(v);
        }
    }

    fn push_history(&mut self, value: f64) {
        // ---
        if self.history_capacity == 0 {
            return;
        }
        while self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(value);
    }
}

/// Level interpretation attached to a sensor snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelReading<L> {
    pub level: L,
    pub message: &'static str,
}

/// Everything known about one sensor address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorMetrics {
    // ---
    pub address: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub metrics: BTreeMap<MetricKind, MetricRecord>,
    pub blue_led: Option<bool>,
    pub salinity_level: Option<LevelReading<SalinityLevel>>,
    pub ph_level: Option<LevelReading<PhLevel>>,
}

impl SensorMetrics {
    // ---
    pub fn placeholder(address: &str, ranges: &IdealRanges, history_capacity: usize) -> Self {
        // ---
        let metrics = MetricKind::ALL
            .iter()
            .map(|&kind| {
                (
                    kind,
                    MetricRecord::placeholder(kind, address, ranges.get(kind), history_capacity),
                )
            })
            .collect();

        Self {
            address: address.to_string(),
            last_seen: None,
            metrics,
            blue_led: None,
            salinity_level: None,
            ph_level: None,
        }
    }

    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        self.metrics.get(&kind).and_then(|m| m.value)
    }

    /// Recompute the level interpretations from the current values.
    pub fn refresh_levels(&mut self) {
        // ---
        self.salinity_level = self.value(MetricKind::SoilSalinity).map(|ppm| {
            let level = interpret_salinity_level(ppm);
            LevelReading {
                level,
                message: level.message(),
            }
        });
        self.ph_level = self.value(MetricKind::SoilPh).map(|ph| {
            let level = interpret_ph_level(ph);
            LevelReading {
                level,
                message: level.message(),
            }
        });
    }
}
