//! The refresh cycle and the dashboard state it maintains.
//!
//! A cycle collects everything it needs from the network without holding the
//! state lock, then applies the results under the lock in one step. Cycles
//! carry a monotonic id; a cycle that finishes after a newer one has been
//! applied is discarded.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::alerts::{
    condition_state, filter_dismissed, generate_alerts, newly_active, suggestions, Alert,
    AlertConditionKey, ConditionState, DismissalRecord, Dismissals,
};
use crate::client::{BackendClient, BackendError};
use crate::config::Config;
use crate::convert::diagnose_salinity;
use crate::fetcher::{fetch_all, FetchBatch};
use crate::metrics::SensorMetrics;
use crate::normalize::{apply_batch, NormalizeSettings};
use crate::resolver::{resolve, ActuatorBoard, ActuatorCategory, ActuatorState, Resolution};
use crate::store::DismissalStore;

// ---

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub user_id: u32,
    pub window_secs: u32,

    /// When non-empty, these addresses are fetched instead of the resolved ones.
    pub configured_addresses: Vec<String>,
    pub dismissal_max_age: Duration,
    pub normalize: NormalizeSettings,
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            user_id: cfg.user_id,
            window_secs: cfg.telemetry_window_secs,
            configured_addresses: cfg.sensor_addresses.clone(),
            dismissal_max_age: cfg.dismissal_max_age,
            normalize: cfg.normalize_settings(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    /// Device list or some sensors unreachable; stale records are shown.
    Degraded,
    #[default]
    Offline,
}

impl Connectivity {
    fn assess(devices_ok: bool, batch: &FetchBatch) -> Self {
        // ---
        if devices_ok && batch.failed.is_empty() {
            Connectivity::Online
        } else if devices_ok || !batch.fetched.is_empty() {
            Connectivity::Degraded
        } else {
            Connectivity::Offline
        }
    }
}

/// Everything the HTTP layer renders.
#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    // ---
    pub sensors: BTreeMap<String, SensorMetrics>,
    pub actuators: ActuatorBoard,
    pub alerts: Vec<Alert>,
    pub suggestions: Vec<String>,
    pub connectivity: Connectivity,
    pub last_update: Option<DateTime<Utc>>,
    pub applied_cycle: u64,

    /// Sensor addresses from the last successful device listing.
    known_addresses: Vec<String>,

    /// Condition keys generated by the applied cycle, before filtering.
    generated: HashSet<AlertConditionKey>,
    dismissals: Dismissals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub applied: bool,
    pub connectivity: Connectivity,
    pub sensors_requested: usize,
    pub sensors_updated: usize,
    pub sensors_failed: Vec<String>,
    pub alerts: usize,
    pub new_alerts: usize,
    pub dismissals_pruned: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub connectivity: Connectivity,
    pub last_update: Option<DateTime<Utc>>,
    pub applied_cycle: u64,
    pub preferred_endpoint: Option<String>,
    pub dismissal_store: &'static str,
    pub sensors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsView {
    pub alerts: Vec<Alert>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("alert condition {key} is not active ({state:?})")]
    NotActive { key: String, state: ConditionState },

    #[error("no switch is bound to {0}")]
    ActuatorUnbound(ActuatorCategory),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("dismissal store: {0:#}")]
    Store(anyhow::Error),
}

/// Network results of one cycle, not yet applied.
#[derive(Debug)]
struct CycleOutcome {
    cycle: u64,
    started_at: DateTime<Utc>,
    dismissals: Dismissals,
    dismissals_pruned: u64,
    resolution: Option<Resolution>,

    /// The current address list, when the listing answered or addresses
    /// are configured. `None` means the cached list was used.
    active: Option<Vec<String>>,
    requested: usize,
    batch: FetchBatch,
}

#[derive(Debug)]
pub struct Pipeline {
    client: BackendClient,
    store: DismissalStore,
    settings: PipelineSettings,
    state: RwLock<Dashboard>,
    next_cycle: AtomicU64,
    dismiss_lock: Mutex<()>,
}

impl Pipeline {
    // ---
    pub fn new(client: BackendClient, store: DismissalStore, settings: PipelineSettings) -> Self {
        Self {
            client,
            store,
            settings,
            state: RwLock::new(Dashboard::default()),
            next_cycle: AtomicU64::new(1),
            dismiss_lock: Mutex::new(()),
        }
    }

    fn allocate_cycle(&self) -> u64 {
        self.next_cycle.fetch_add(1, Ordering::Relaxed)
    }

    /// Run one full refresh cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        // ---
        let cycle = self.allocate_cycle();
        async {
            let outcome = self.collect(cycle).await;
            self.apply(outcome).await
        }
        .instrument(info_span!("cycle", id = cycle))
        .await
    }

    async fn collect(&self, cycle: u64) -> CycleOutcome {
        // ---
        let started_at = Utc::now();

        let dismissals_pruned = match self
            .store
            .prune_older_than(started_at, self.settings.dismissal_max_age)
            .await
        {
            Ok(pruned) => {
                if pruned > 0 {
                    info!("Pruned {} expired dismissal records", pruned);
                }
                pruned
            }
            Err(e) => {
                warn!("Dismissal sweep failed: {:#}", e);
                0
            }
        };

        let dismissals = match self.store.load_all().await {
            Ok(dismissals) => dismissals,
            Err(e) => {
                error!("Loading dismissals failed, alerts will not be filtered: {:#}", e);
                Dismissals::new()
            }
        };

        let resolution = match self.client.get_devices(self.settings.user_id).await {
            Ok(devices) => {
                let resolution = resolve(&devices);
                debug!(
                    sensors = resolution.sensor_addresses.len(),
                    switches = resolution.switches.len(),
                    skipped = resolution.skipped,
                    "devices resolved"
                );
                Some(resolution)
            }
            Err(e) => {
                warn!("Device list unavailable, using cached sensor addresses: {}", e);
                None
            }
        };

        let active = if !self.settings.configured_addresses.is_empty() {
            Some(self.settings.configured_addresses.clone())
        } else {
            resolution.as_ref().map(|r| r.sensor_addresses.clone())
        };
        let addresses = match &active {
            Some(active) => active.clone(),
            None => self.state.read().await.known_addresses.clone(),
        };

        let batch = fetch_all(&self.client, &addresses, self.settings.window_secs).await;

        let raw_salinity: Vec<(String, f64)> = batch
            .fetched
            .iter()
            .filter_map(|f| {
                let raw = f.sample.as_ref()?.salinity_raw?;
                Some((f.address.clone(), raw))
            })
            .collect();
        diagnose_salinity(&raw_salinity);

        CycleOutcome {
            cycle,
            started_at,
            dismissals,
            dismissals_pruned,
            resolution,
            active,
            requested: addresses.len(),
            batch,
        }
    }

    async fn apply(&self, outcome: CycleOutcome) -> CycleReport {
        // ---
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let mut report = CycleReport {
            cycle: outcome.cycle,
            applied: false,
            connectivity: state.connectivity,
            sensors_requested: outcome.requested,
            sensors_updated: 0,
            sensors_failed: outcome.batch.failed.clone(),
            alerts: state.alerts.len(),
            new_alerts: 0,
            dismissals_pruned: outcome.dismissals_pruned,
        };

        if outcome.cycle <= state.applied_cycle {
            info!(
                "Cycle {} discarded, cycle {} already applied",
                outcome.cycle, state.applied_cycle
            );
            return report;
        }

        let devices_ok = outcome.resolution.is_some();
        if let Some(resolution) = &outcome.resolution {
            state.known_addresses = resolution.sensor_addresses.clone();
            state.actuators = ActuatorBoard::from_switches(&resolution.switches);
        }

        // Sensors that left the listing go; failed fetches keep their records
        if let Some(active) = &outcome.active {
            let before = state.sensors.len();
            state.sensors.retain(|address, _| active.contains(address));
            let removed = before - state.sensors.len();
            if removed > 0 {
                info!("Dropped {} sensors no longer listed", removed);
            }
        }

        let updated = apply_batch(
            &mut state.sensors,
            &outcome.batch.fetched,
            &self.settings.normalize,
            outcome.started_at,
        );

        // Dismissals made while this cycle was in flight are not in its snapshot
        let mut dismissals = outcome.dismissals;
        for (key, record) in &state.dismissals {
            if record.dismissed_at >= outcome.started_at {
                dismissals.entry(key.clone()).or_insert(*record);
            }
        }

        let generated = generate_alerts(&state.sensors, outcome.started_at);
        state.generated = generated.iter().map(|a| a.key.clone()).collect();
        let visible = filter_dismissed(generated, &dismissals);

        let fresh = newly_active(&visible, &state.alerts);
        for alert in &fresh {
            info!(
                key = %alert.key,
                sensor = %alert.sensor_key,
                "New alert: {} - {}",
                alert.title,
                alert.message
            );
        }
        report.new_alerts = fresh.len();

        state.suggestions = suggestions(&state.sensors);
        state.alerts = visible;
        state.dismissals = dismissals;
        state.connectivity = Connectivity::assess(devices_ok, &outcome.batch);
        if state.connectivity != Connectivity::Offline {
            state.last_update = Some(outcome.started_at);
        }
        state.applied_cycle = outcome.cycle;

        report.applied = true;
        report.connectivity = state.connectivity;
        report.sensors_updated = updated;
        report.alerts = state.alerts.len();

        info!(
            "Cycle {} applied: {}/{} sensors updated, {} alerts ({} new), {:?}",
            outcome.cycle,
            updated,
            outcome.requested,
            report.alerts,
            report.new_alerts,
            report.connectivity
        );
        report
    }

    /// Dismiss a currently visible alert condition.
    pub async fn dismiss(&self, key: &str) -> Result<DismissalRecord, PipelineError> {
        // ---
        let key = AlertConditionKey::from_hex(key);

        // One dismissal at a time; the state lock is never held across the store call
        let _dismissing = self.dismiss_lock.lock().await;

        {
            let state = self.state.read().await;
            match condition_state(&key, &state.generated, &state.dismissals) {
                ConditionState::Active => {}
                other => {
                    return Err(PipelineError::NotActive {
                        key: key.to_string(),
                        state: other,
                    })
                }
            }
        }

        let record = self.store.dismiss(&key, Utc::now()).await.map_err(|e| {
            error!(%key, "Failed to persist dismissal: {:#}", e);
            PipelineError::Store(e)
        })?;

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.dismissals.insert(key.clone(), record);
        state.alerts.retain(|a| a.key != key);
        info!(%key, count = record.count, "Alert dismissed");
        Ok(record)
    }

    /// Switch the actuator bound to `category` and mirror the new state locally.
    pub async fn set_actuator(
        &self,
        category: ActuatorCategory,
        on: bool,
    ) -> Result<ActuatorState, PipelineError> {
        // ---
        let switch_id = self
            .state
            .read()
            .await
            .actuators
            .get(category)
            .and_then(|a| a.device.as_ref())
            .map(|d| d.id)
            .ok_or(PipelineError::ActuatorUnbound(category))?;

        self.client.set_switch(switch_id, on).await?;

        let mut state = self.state.write().await;
        state.actuators.set_active(category, on);
        state
            .actuators
            .get(category)
            .cloned()
            .ok_or(PipelineError::ActuatorUnbound(category))
    }

    // --- snapshots

    pub async fn sensors(&self) -> BTreeMap<String, SensorMetrics> {
        self.state.read().await.sensors.clone()
    }

    pub async fn alerts(&self) -> AlertsView {
        let state = self.state.read().await;
        AlertsView {
            alerts: state.alerts.clone(),
            suggestions: state.suggestions.clone(),
        }
    }

    pub async fn actuators(&self) -> ActuatorBoard {
        self.state.read().await.actuators.clone()
    }

    pub async fn status(&self) -> StatusView {
        // ---
        let state = self.state.read().await;
        StatusView {
            connectivity: state.connectivity,
            last_update: state.last_update,
            applied_cycle: state.applied_cycle,
            preferred_endpoint: self.client.endpoints().preferred_url().map(String::from),
            dismissal_store: self.store.backend_name(),
            sensors: state.sensors.len(),
        }
    }
}

/// Run a refresh cycle every `period`, starting immediately.
pub fn spawn_refresh_loop(pipeline: Arc<Pipeline>, period: std::time::Duration) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            pipeline.run_cycle().await;
        }
    })
}
