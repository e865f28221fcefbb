//! Threshold alerts, their content-derived identity, and dismissal filtering.
//!
//! Alerts are regenerated from scratch every cycle, so the per-batch `id` is
//! not stable. Dismissals are matched on [`AlertConditionKey`] instead, a
//! digest of `(type, sensor_key, message)`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::metrics::{classify, MetricKind, MetricRecord, MetricStatus, SensorMetrics};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Warning,
    Critical,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Warning => "warning",
            AlertType::Critical => "critical",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            AlertType::Warning => "Advertencia",
            AlertType::Critical => "Alerta Crítica",
        }
    }
}

/// Stable identity of an alert condition across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AlertConditionKey(String);

impl AlertConditionKey {
    // ---
    pub fn new(alert_type: AlertType, sensor_key: &str, message: &str) -> Self {
        // ---
        let mut hasher = blake3::Hasher::new();
        for field in [alert_type.as_str(), sensor_key, message] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Wrap a digest that was persisted earlier.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    // ---
    /// Sequence number within one generated batch.
    pub id: u32,
    pub key: AlertConditionKey,

    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub title: &'static str,

    /// `<address>:<metric>`.
    pub sensor_key: String,
    pub source_address: String,
    pub metric: MetricKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub is_active: bool,
}

/// Alert message for an out-of-range value.
pub fn alert_message(record: &MetricRecord, value: f64) -> String {
    // ---
    let direction = if value < record.ideal_range.min() {
        "muy baja"
    } else {
        "muy alta"
    };
    format!(
        "{} {}: {}{} (ideal: {}-{}{})",
        record.kind.display_name(),
        direction,
        value,
        record.unit,
        record.ideal_range.min(),
        record.ideal_range.max(),
        record.unit
    )
}

/// Scan every record with a value and emit an alert for each one outside
/// its ideal range.
pub fn generate_alerts(
    sensors: &BTreeMap<String, SensorMetrics>,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    // ---
    let mut alerts = Vec::new();
    let mut next_id = 1;

    for sensor in sensors.values() {
        for record in sensor.metrics.values() {
            let Some(value) = record.value else {
                continue;
            };
            let alert_type = match classify(Some(value), &record.ideal_range) {
                MetricStatus::Critical => AlertType::Critical,
                MetricStatus::Warning => AlertType::Warning,
                MetricStatus::Optimal | MetricStatus::Inactive => continue,
            };

            let sensor_key = format!("{}:{}", sensor.address, record.kind.key());
            let message = alert_message(record, value);
            alerts.push(Alert {
                id: next_id,
                key: AlertConditionKey::new(alert_type, &sensor_key, &message),
                alert_type,
                title: alert_type.title(),
                sensor_key,
                source_address: sensor.address.clone(),
                metric: record.kind,
                message,
                timestamp: now,
                is_active: true,
            });
            next_id += 1;
        }
    }
    alerts
}

// ---

/// A persisted user dismissal of one alert condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DismissalRecord {
    pub dismissed_at: DateTime<Utc>,
    pub count: u32,
}

pub type Dismissals = HashMap<AlertConditionKey, DismissalRecord>;

/// Drop alerts whose condition has been dismissed.
pub fn filter_dismissed(alerts: Vec<Alert>, dismissals: &Dismissals) -> Vec<Alert> {
    alerts
        .into_iter()
        .filter(|a| !dismissals.contains_key(&a.key))
        .collect()
}

/// Insert or bump the dismissal record for `key`.
pub fn record_dismissal(
    dismissals: &mut Dismissals,
    key: AlertConditionKey,
    now: DateTime<Utc>,
) -> DismissalRecord {
    // ---
    let record = dismissals.entry(key).or_insert(DismissalRecord {
        dismissed_at: now,
        count: 0,
    });
    record.dismissed_at = now;
    record.count += 1;
    *record
}

/// Remove records older than `max_age`. Returns how many were removed.
pub fn sweep_expired(dismissals: &mut Dismissals, now: DateTime<Utc>, max_age: Duration) -> usize {
    // ---
    let before = dismissals.len();
    dismissals.retain(|_, record| now - record.dismissed_at < max_age);
    before - dismissals.len()
}

/// Where an alert condition stands this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionState {
    /// Not generated this cycle.
    Absent,
    /// Generated and visible.
    Active,
    /// Generated but hidden by a dismissal.
    Dismissed,
}

pub fn condition_state(
    key: &AlertConditionKey,
    generated: &HashSet<AlertConditionKey>,
    dismissals: &Dismissals,
) -> ConditionState {
    // ---
    if !generated.contains(key) {
        ConditionState::Absent
    } else if dismissals.contains_key(key) {
        ConditionState::Dismissed
    } else {
        ConditionState::Active
    }
}

/// Alerts in `current` whose condition was not visible in `previous`.
pub fn newly_active<'a>(current: &'a [Alert], previous: &[Alert]) -> Vec<&'a Alert> {
    // ---
    let seen: HashSet<&AlertConditionKey> = previous.iter().map(|a| &a.key).collect();
    current.iter().filter(|a| !seen.contains(&a.key)).collect()
}

/// Operator suggestions derived from out-of-range readings.
pub fn suggestions(sensors: &BTreeMap<String, SensorMetrics>) -> Vec<String> {
    // ---
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !out.iter().any(|existing| existing == s) {
            out.push(s.to_string());
        }
    };

    for sensor in sensors.values() {
        for record in sensor.metrics.values() {
            let Some(value) = record.value else {
                continue;
            };
            match record.kind {
                MetricKind::Temperature if value > record.ideal_range.max() => {
                    push("Activar ventilación para reducir temperatura")
                }
                MetricKind::SoilHumidity if value < record.ideal_range.min() => {
                    push("Activar sistema de riego")
                }
                MetricKind::AirHumidity if value < record.ideal_range.min() => {
                    push("Considerar nebulización para aumentar humedad")
                }
                _ => {}
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::metrics::{IdealRange, IdealRanges};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
    }

    fn sensors_with(
        address: &str,
        kind: MetricKind,
        range: (f64, f64),
        value: f64,
    ) -> BTreeMap<String, SensorMetrics> {
        // ---
        let mut sensor = SensorMetrics::placeholder(address, &IdealRanges::default(), 10);
        let record = sensor.metrics.get_mut(&kind).unwrap();
        record.ideal_range = IdealRange::new(range.0, range.1).unwrap();
        record.update(Some(value), now(), None);
        BTreeMap::from([(address.to_string(), sensor)])
    }

    fn temperature_alerts(value: f64) -> Vec<Alert> {
        generate_alerts(&sensors_with("AA", MetricKind::Temperature, (20.0, 26.0), value), now())
    }

    #[test]
    fn test_severity_thresholds() {
        // ---
        let critical = temperature_alerts(15.0);
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].alert_type, AlertType::Critical);
        assert_eq!(critical[0].title, "Alerta Crítica");

        let warning = temperature_alerts(17.0);
        assert_eq!(warning.len(), 1);
        assert_eq!(warning[0].alert_type, AlertType::Warning);

        assert!(temperature_alerts(23.0).is_empty());
    }

    #[test]
    fn test_message_template() {
        // ---
        assert_eq!(
            temperature_alerts(15.0)[0].message,
            "Temperatura muy baja: 15°C (ideal: 20-26°C)"
        );
        assert_eq!(
            temperature_alerts(27.5)[0].message,
            "Temperatura muy alta: 27.5°C (ideal: 20-26°C)"
        );

        let ph = generate_alerts(&sensors_with("AA", MetricKind::SoilPh, (6.0, 7.5), 5.2), now());
        assert_eq!(ph[0].message, "pH del suelo muy baja: 5.2pH (ideal: 6-7.5pH)");
        assert_eq!(ph[0].sensor_key, "AA:soilPH");
    }

    #[test]
    fn test_null_values_never_alert() {
        // ---
        let sensors = BTreeMap::from([(
            "AA".to_string(),
            SensorMetrics::placeholder("AA", &IdealRanges::default(), 10),
        )]);
        assert!(generate_alerts(&sensors, now()).is_empty());
    }

    #[test]
    fn test_ids_are_sequential_per_batch() {
        // ---
        let mut sensors = sensors_with("AA", MetricKind::Temperature, (20.0, 26.0), 15.0);
        sensors.extend(sensors_with("BB", MetricKind::AirHumidity, (40.0, 80.0), 95.0));
        let alerts = generate_alerts(&sensors, now());
        let ids: Vec<u32> = alerts.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_key_ignores_id_and_timestamp() {
        // ---
        let cold = sensors_with("AA", MetricKind::Temperature, (20.0, 26.0), 15.0);
        let first = generate_alerts(&cold, now());

        let mut later = sensors_with("00", MetricKind::AirHumidity, (40.0, 80.0), 95.0);
        later.extend(sensors_with("AA", MetricKind::Temperature, (20.0, 26.0), 15.0));
        let second = generate_alerts(&later, now() + Duration::minutes(5));
        let again = second.iter().find(|a| a.sensor_key == "AA:temperature").unwrap();

        assert_ne!(first[0].id, again.id);
        assert_eq!(first[0].key, again.key);
    }

    #[test]
    fn test_key_distinguishes_fields() {
        // ---
        let base = AlertConditionKey::new(AlertType::Warning, "AA:temperature", "m");
        assert_ne!(base, AlertConditionKey::new(AlertType::Critical, "AA:temperature", "m"));
        assert_ne!(base, AlertConditionKey::new(AlertType::Warning, "BB:temperature", "m"));
        assert_ne!(base, AlertConditionKey::new(AlertType::Warning, "AA:temperature", "n"));
        // field boundaries are part of the digest
        assert_ne!(
            AlertConditionKey::new(AlertType::Warning, "ab", "c"),
            AlertConditionKey::new(AlertType::Warning, "a", "bc")
        );
        assert_eq!(base.as_str().len(), 64);
    }

    #[test]
    fn test_dismissed_condition_is_filtered_next_cycle() {
        // ---
        let cycle1 = temperature_alerts(15.0);
        let mut dismissals = Dismissals::new();
        record_dismissal(&mut dismissals, cycle1[0].key.clone(), now());

        let cycle2 = temperature_alerts(15.0);
        assert!(filter_dismissed(cycle2, &dismissals).is_empty());

        // a changed value is a changed message, so the condition resurfaces
        let cycle3 = temperature_alerts(14.0);
        assert_eq!(filter_dismissed(cycle3, &dismissals).len(), 1);
    }

    #[test]
    fn test_record_dismissal_counts() {
        // ---
        let key = AlertConditionKey::from_hex("abc");
        let mut dismissals = Dismissals::new();
        record_dismissal(&mut dismissals, key.clone(), now());
        let record = record_dismissal(&mut dismissals, key.clone(), now() + Duration::hours(1));

        assert_eq!(record.count, 2);
        assert_eq!(record.dismissed_at, now() + Duration::hours(1));
    }

    #[test]
    fn test_sweep_expires_old_records() {
        // ---
        let mut dismissals = Dismissals::new();
        let old = AlertConditionKey::from_hex("old");
        let new = AlertConditionKey::from_hex("new");
        record_dismissal(&mut dismissals, old, now() - Duration::days(8));
        record_dismissal(&mut dismissals, new, now() - Duration::days(1));

        let removed = sweep_expired(&mut dismissals, now(), Duration::days(7));
        assert_eq!(removed, 1);
        assert!(dismissals.contains_key(&AlertConditionKey::from_hex("new")));
    }

    #[test]
    fn test_condition_state_transitions() {
        // ---
        let alerts = temperature_alerts(15.0);
        let key = alerts[0].key.clone();
        let generated: HashSet<_> = alerts.iter().map(|a| a.key.clone()).collect();
        let mut dismissals = Dismissals::new();

        assert_eq!(condition_state(&key, &generated, &dismissals), ConditionState::Active);
        record_dismissal(&mut dismissals, key.clone(), now() - Duration::days(8));
        assert_eq!(condition_state(&key, &generated, &dismissals), ConditionState::Dismissed);
        assert_eq!(condition_state(&key, &HashSet::new(), &dismissals), ConditionState::Absent);

        sweep_expired(&mut dismissals, now(), Duration::days(7));
        assert_eq!(condition_state(&key, &generated, &dismissals), ConditionState::Active);
    }

    #[test]
    fn test_newly_active() {
        // ---
        let previous = temperature_alerts(15.0);
        let mut sensors = sensors_with("AA", MetricKind::Temperature, (20.0, 26.0), 15.0);
        sensors.extend(sensors_with("BB", MetricKind::AirHumidity, (40.0, 80.0), 95.0));
        let current = generate_alerts(&sensors, now());

        let fresh = newly_active(&current, &previous);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].sensor_key, "BB:airHumidity");
    }

    #[test]
    fn test_suggestions() {
        // ---
        let mut sensors = sensors_with("AA", MetricKind::Temperature, (18.0, 30.0), 33.0);
        sensors.extend(sensors_with("BB", MetricKind::SoilHumidity, (30.0, 70.0), 20.0));
        sensors.extend(sensors_with("CC", MetricKind::Temperature, (18.0, 30.0), 35.0));

        assert_eq!(
            suggestions(&sensors),
            vec![
                "Activar ventilación para reducir temperatura".to_string(),
                "Activar sistema de riego".to_string(),
            ]
        );
    }
}
