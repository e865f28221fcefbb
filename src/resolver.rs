//! Device classification: which devices are telemetry sensors and which
//! switches drive which greenhouse actuator.
//!
//! Each device is classified exactly once into a [`DeviceRole`]; everything
//! downstream works from the role instead of re-matching names.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::models::Device;

// ---

/// Actuator categories shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorCategory {
    Irrigation,
    Ventilation,
    Lighting,
    Heating,
    Windows,
}

impl ActuatorCategory {
    // ---
    pub const ALL: [ActuatorCategory; 5] = [
        ActuatorCategory::Irrigation,
        ActuatorCategory::Ventilation,
        ActuatorCategory::Lighting,
        ActuatorCategory::Heating,
        ActuatorCategory::Windows,
    ];

    /// Name keywords, checked in category order; the first match wins.
    fn keywords(self) -> &'static [&'static str] {
        match self {
            ActuatorCategory::Irrigation => &["riego", "irrigation", "water"],
            ActuatorCategory::Ventilation => &["ventil", "fan", "aire"],
            ActuatorCategory::Lighting => &["luz", "led", "light"],
            ActuatorCategory::Heating => &["calef", "heat", "temperatura"],
            ActuatorCategory::Windows => &["ventana", "window", "apertura"],
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            ActuatorCategory::Irrigation => "Sistema de Riego",
            ActuatorCategory::Ventilation => "Ventilación",
            ActuatorCategory::Lighting => "Iluminación LED",
            ActuatorCategory::Heating => "Calefacción",
            ActuatorCategory::Windows => "Ventanas Automatizadas",
        }
    }

    fn default_automatic(self) -> bool {
        matches!(
            self,
            ActuatorCategory::Ventilation | ActuatorCategory::Lighting | ActuatorCategory::Windows
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActuatorCategory::Irrigation => "irrigation",
            ActuatorCategory::Ventilation => "ventilation",
            ActuatorCategory::Lighting => "lighting",
            ActuatorCategory::Heating => "heating",
            ActuatorCategory::Windows => "windows",
        }
    }

    /// Category for a lowercase switch name.
    pub fn match_name(lower_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.keywords().iter().any(|k| lower_name.contains(k)))
    }
}

impl fmt::Display for ActuatorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActuatorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown actuator category: {s}"))
    }
}

/// What a device is, decided once per device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRole {
    /// A telemetry sensor, keyed by its hardware address.
    Sensor { address: String },
    Actuator(ActuatorCategory),
    Unknown,
}

impl DeviceRole {
    // ---
    pub fn classify(device: &Device) -> Self {
        // ---
        let name = device.display_name().to_lowercase();
        let description = device
            .description
            .as_deref()
            .unwrap_or_default()
            .to_lowercase();

        if name.contains("sensor") || description.contains("sensor") {
            return match device.address() {
                Some(address) => DeviceRole::Sensor { address },
                None => DeviceRole::Unknown,
            };
        }
        if name.contains("switch") || description.contains("switch") {
            return ActuatorCategory::match_name(&name)
                .map(DeviceRole::Actuator)
                .unwrap_or(DeviceRole::Unknown);
        }
        DeviceRole::Unknown
    }
}

/// A physical switch bound to an actuator category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchInfo {
    // ---
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub kind: String,
    pub location: String,
}

impl SwitchInfo {
    fn from_device(device: &Device) -> Option<Self> {
        // ---
        Some(Self {
            id: device.id?,
            name: device
                .name
                .clone()
                .unwrap_or_else(|| "Switch sin nombre".to_string()),
            description: device.description.clone().unwrap_or_default(),
            is_active: device.state.unwrap_or(false),
            kind: device.kind.clone().unwrap_or_else(|| "switch".to_string()),
            location: device.location.clone().unwrap_or_default(),
        })
    }
}

/// Result of classifying a device listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    // ---
    /// Unique sensor addresses in listing order.
    pub sensor_addresses: Vec<String>,
    pub switches: Vec<(ActuatorCategory, SwitchInfo)>,

    /// Devices that matched neither role or were malformed.
    pub skipped: usize,
}

pub fn resolve(devices: &[Device]) -> Resolution {
    // ---
    let mut resolution = Resolution::default();

    for device in devices {
        match DeviceRole::classify(device) {
            DeviceRole::Sensor { address } => {
                if !resolution.sensor_addresses.contains(&address) {
                    debug!(%address, name = device.display_name(), "sensor found");
                    resolution.sensor_addresses.push(address);
                }
            }
            DeviceRole::Actuator(category) => match SwitchInfo::from_device(device) {
                Some(info) => {
                    debug!(id = info.id, name = %info.name, %category, "switch found");
                    resolution.switches.push((category, info));
                }
                None => {
                    debug!(name = device.display_name(), "switch without id skipped");
                    resolution.skipped += 1;
                }
            },
            DeviceRole::Unknown => {
                debug!(name = device.display_name(), "device not mapped");
                resolution.skipped += 1;
            }
        }
    }
    resolution
}

// ---

/// Dashboard state of one actuator category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorState {
    // ---
    pub category: ActuatorCategory,
    pub name: String,
    pub is_active: bool,
    pub is_automatic: bool,

    /// The switch controlling this category, when one is connected.
    pub device: Option<SwitchInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorBoard(pub BTreeMap<ActuatorCategory, ActuatorState>);

impl Default for ActuatorBoard {
    fn default() -> Self {
        Self(
            ActuatorCategory::ALL
                .into_iter()
                .map(|category| {
                    (
                        category,
                        ActuatorState {
                            category,
                            name: category.default_name().to_string(),
                            is_active: false,
                            is_automatic: category.default_automatic(),
                            device: None,
                        },
                    )
                })
                .collect(),
        )
    }
}

impl ActuatorBoard {
    // ---
    /// Build the board from resolved switches; a later switch in the same
    /// category replaces an earlier one.
    pub fn from_switches(switches: &[(ActuatorCategory, SwitchInfo)]) -> Self {
        // ---
        let mut board = Self::default();
        for (category, info) in switches {
            if let Some(state) = board.0.get_mut(category) {
                state.name = info.name.clone();
                state.is_active = info.is_active;
                state.device = Some(info.clone());
            }
        }
        board
    }

    pub fn get(&self, category: ActuatorCategory) -> Option<&ActuatorState> {
        self.0.get(&category)
    }

    pub fn set_active(&mut self, category: ActuatorCategory, on: bool) {
        // ---
        if let Some(state) = self.0.get_mut(&category) {
            state.is_active = on;
            if let Some(device) = state.device.as_mut() {
                device.is_active = on;
            }
        }
    }
}
