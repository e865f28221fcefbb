//! Unit converters for raw analog sensor readings.
//!
//! Every converter is a pure function. Non-finite input yields `None` so a
//! missing or unparseable reading is never turned into a plausible number.

use serde::Serialize;

// ---

/// Reference temperature for conductivity compensation and pH estimation (°C).
pub const REFERENCE_TEMP_C: f64 = 25.0;

/// EC → TDS conversion factor for soil salts.
pub const TDS_FACTOR: f64 = 0.64;

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Calibration for a capacitive soil moisture sensor.
///
/// The sensor reads lower when wetter, so `dry_ref` must be greater than
/// `wet_ref`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoilCalibration {
    // ---
    /// Analog reading in dry air (0 %).
    pub dry_ref: f64,

    /// Analog reading submerged in water (100 %).
    pub wet_ref: f64,
}

impl Default for SoilCalibration {
    fn default() -> Self {
        Self {
            dry_ref: 2800.0,
            wet_ref: 1300.0,
        }
    }
}

impl SoilCalibration {
    // ---
    /// Map an analog reading to soil moisture percent, clamped to `[0, 100]`.
    pub fn percent(&self, analog_raw: f64) -> Option<f64> {
        // ---
        if !analog_raw.is_finite() || self.dry_ref <= self.wet_ref {
            return None;
        }
        let clamped = analog_raw.clamp(self.wet_ref, self.dry_ref);
        let percent = (self.dry_ref - clamped) / (self.dry_ref - self.wet_ref) * 100.0;
        Some(round1(percent))
    }
}

/// Calibration for the analog conductivity sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConductivityCalibration {
    // ---
    /// Full-scale ADC reading (10-bit by default).
    pub max_analog: f64,

    /// Conductivity at full scale, in µS/cm.
    pub max_ec: f64,

    /// EC → ppm factor.
    pub tds_factor: f64,
}

impl Default for ConductivityCalibration {
    fn default() -> Self {
        Self {
            max_analog: 1023.0,
            max_ec: 3000.0,
            tds_factor: TDS_FACTOR,
        }
    }
}

impl ConductivityCalibration {
    // ---
    /// Convert an analog conductivity reading to salinity in ppm.
    ///
    /// EC rises about 2 % per °C above 25 °C; the reading is compensated back
    /// to the reference temperature before applying the TDS factor. Returns
    /// `None` when the compensation factor is not positive (below -25 °C).
    pub fn salinity_ppm(&self, analog_raw: f64, temperature_c: f64) -> Option<f64> {
        // ---
        if !analog_raw.is_finite() || !temperature_c.is_finite() || self.max_analog <= 0.0 {
            return None;
        }
        let ec = analog_raw / self.max_analog * self.max_ec;
        let compensation = 1.0 + 0.02 * (temperature_c - REFERENCE_TEMP_C);
        if compensation <= 0.0 {
            return None;
        }
        Some(round1(ec / compensation * self.tds_factor))
    }
}

/// Inverse of the TDS conversion: salinity (ppm) back to EC (µS/cm).
pub fn salinity_to_ec(salinity_ppm: f64) -> f64 {
    salinity_ppm / TDS_FACTOR
}

/// Estimate soil pH from salinity, moisture and temperature.
///
/// More salt is more acidic, more moisture slightly more basic, more heat
/// slightly more acidic. Each factor is clamped to its own band and the
/// result to `[5.0, 8.0]`.
pub fn ph_from_multi_factor(
    salinity_ppm: f64,
    soil_moisture_percent: f64,
    temperature_c: f64,
) -> Option<f64> {
    // ---
    if !(salinity_ppm.is_finite() && soil_moisture_percent.is_finite() && temperature_c.is_finite())
    {
        return None;
    }
    let salinity_factor = ((400.0 - salinity_ppm) * 0.001).clamp(-0.8, 0.3);
    let moisture_factor = ((soil_moisture_percent - 50.0) * 0.003).clamp(-0.2, 0.2);
    let temp_factor = ((REFERENCE_TEMP_C - temperature_c) * 0.01).clamp(-0.15, 0.15);

    let ph = (7.0 + salinity_factor + moisture_factor + temp_factor).clamp(5.0, 8.0);

    tracing::debug!(
        salinity_factor,
        moisture_factor,
        temp_factor,
        ph,
        "multi-factor pH estimate"
    );
    Some(round1(ph))
}

/// Single-factor pH estimate from conductivity, clamped to `[4.5, 8.5]`.
pub fn ph_from_ec(ec_micro_siemens: f64) -> Option<f64> {
    // ---
    if !ec_micro_siemens.is_finite() {
        return None;
    }
    let ph = (7.5 - (ec_micro_siemens / 1000.0) * 1.2).clamp(4.5, 8.5);
    Some(round1(ph))
}

// ---

/// Salinity bands and what they mean for the crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SalinityLevel {
    Optimal,
    Good,
    Warning,
    High,
    Critical,
}

impl SalinityLevel {
    pub fn message(self) -> &'static str {
        match self {
            SalinityLevel::Optimal => "Nivel óptimo para cultivos",
            SalinityLevel::Good => "Aceptable, monitorear",
            SalinityLevel::Warning => "Estrés moderado en plantas",
            SalinityLevel::High => "Estrés severo, riego necesario",
            SalinityLevel::Critical => "Nivel crítico, plantas en peligro",
        }
    }
}

pub fn interpret_salinity_level(salinity_ppm: f64) -> SalinityLevel {
    // ---
    match salinity_ppm {
        v if v <= 400.0 => SalinityLevel::Optimal,
        v if v <= 800.0 => SalinityLevel::Good,
        v if v <= 1500.0 => SalinityLevel::Warning,
        v if v <= 2500.0 => SalinityLevel::High,
        _ => SalinityLevel::Critical,
    }
}

/// Soil pH bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhLevel {
    Optimal,
    Acidic,
    Alkaline,
    VeryAcidic,
    VeryAlkaline,
    Unknown,
}

impl PhLevel {
    pub fn message(self) -> &'static str {
        match self {
            PhLevel::Optimal => "pH ideal para la mayoría de cultivos",
            PhLevel::Acidic => "Suelo ácido, considerar cal agrícola",
            PhLevel::Alkaline => "Suelo básico, monitor nutrientes",
            PhLevel::VeryAcidic => "Muy ácido, tratamiento urgente",
            PhLevel::VeryAlkaline => "Muy básico, ajuste necesario",
            PhLevel::Unknown => "Valor fuera de rango normal",
        }
    }
}

pub fn interpret_ph_level(ph: f64) -> PhLevel {
    // ---
    if (6.0..=7.5).contains(&ph) {
        PhLevel::Optimal
    } else if (5.5..6.0).contains(&ph) {
        PhLevel::Acidic
    } else if ph > 7.5 && ph <= 8.0 {
        PhLevel::Alkaline
    } else if ph < 5.5 {
        PhLevel::VeryAcidic
    } else if ph > 8.0 {
        PhLevel::VeryAlkaline
    } else {
        PhLevel::Unknown
    }
}

// ---

/// What a raw salinity value most likely is, judged by magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalinityScale {
    /// Zero: sensor disconnected or no data.
    Zero,
    /// Below 50: already ppm, very pure water.
    PurePpm,
    /// Below 500: ppm in the normal range for plants.
    Ppm,
    /// Below 3000: high ppm or µS/cm, cannot tell.
    Ambiguous,
    /// 3000 and above: an analog reading that needs conversion.
    Analog,
}

pub fn classify_salinity_scale(raw: f64) -> SalinityScale {
    // ---
    match raw {
        v if v == 0.0 => SalinityScale::Zero,
        v if v < 50.0 => SalinityScale::PurePpm,
        v if v < 500.0 => SalinityScale::Ppm,
        v if v < 3000.0 => SalinityScale::Ambiguous,
        _ => SalinityScale::Analog,
    }
}

/// Log a magnitude diagnosis of a batch of raw salinity values.
///
/// Returns the batch average, or `None` for an empty batch.
pub fn diagnose_salinity(raw_values: &[(String, f64)]) -> Option<f64> {
    // ---
    if raw_values.is_empty() {
        return None;
    }
    for (address, raw) in raw_values {
        tracing::debug!(
            sensor = %address,
            raw,
            scale = ?classify_salinity_scale(*raw),
            "salinity diagnosis"
        );
    }
    let avg = raw_values.iter().map(|(_, v)| v).sum::<f64>() / raw_values.len() as f64;
    let recommendation = if avg > 2000.0 {
        "values look analog, conversion required"
    } else if avg > 500.0 {
        "values are high, check whether they are ppm"
    } else {
        "values look like ppm"
    };
    tracing::debug!(
        sensors = raw_values.len(),
        average = round1(avg),
        recommendation,
        "salinity diagnosis summary"
    );
    Some(avg)
}
