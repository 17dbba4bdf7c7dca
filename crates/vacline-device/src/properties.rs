//! Configuration properties for channel devices.
//!
//! Properties arrive either as a typed structure (JSON/TOML via serde) or
//! as the flat string map a configuration database hands out; both paths
//! end in [`IonPumpProperties`].

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vacline_core::constants::{DEFAULT_LOW_RANGE, DEFAULT_POLLING_CYCLE};
use vacline_core::{CoreError, Result};

fn default_low_range() -> f64 {
    DEFAULT_LOW_RANGE
}

fn default_polling_cycle_ms() -> u64 {
    DEFAULT_POLLING_CYCLE.as_millis() as u64
}

fn default_use_events() -> bool {
    true
}

/// Static configuration of one ion-pump channel device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IonPumpProperties {
    /// Parent controller device name (`domain/family/member`).
    #[serde(default)]
    pub controller: String,

    /// Attributes of the controller this device subscribes to. The first
    /// one not named like a state is the pressure channel; a bracketed
    /// index (`Pressures[2]`) selects one element of a spectrum attribute.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Pressure at or below which the channel reports STANDBY.
    #[serde(default = "default_low_range")]
    pub low_range: f64,

    /// Free-text description shown in the device status.
    #[serde(default)]
    pub description: String,

    /// Subscribe to controller events; when false, the owner is expected to
    /// poll the controller cache and synthesize notifications.
    #[serde(default = "default_use_events")]
    pub use_events: bool,

    /// Fallback polling cycle when events are off, in milliseconds.
    #[serde(default = "default_polling_cycle_ms")]
    pub polling_cycle_ms: u64,
}

impl Default for IonPumpProperties {
    fn default() -> Self {
        Self {
            controller: String::new(),
            channels: Vec::new(),
            low_range: DEFAULT_LOW_RANGE,
            description: String::new(),
            use_events: true,
            polling_cycle_ms: default_polling_cycle_ms(),
        }
    }
}

impl IonPumpProperties {
    /// Build properties from a flat string map.
    ///
    /// Unknown keys are ignored; list values are comma-separated.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidProperty`] when a value does not parse.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let mut properties = Self::default();
        for (key, value) in map {
            match key.to_lowercase().as_str() {
                "controller" | "ionpumpcontroller" => {
                    properties.controller = value.trim().to_string();
                }
                "channel" | "channels" => {
                    properties.channels = value
                        .split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect();
                }
                "lowrange" | "low_range" => {
                    properties.low_range = value
                        .trim()
                        .parse()
                        .map_err(|_| CoreError::invalid_property(key, value))?;
                }
                "description" => {
                    properties.description = value.trim().to_string();
                }
                "useevents" | "use_events" => {
                    properties.use_events = matches!(
                        value.trim().to_lowercase().as_str(),
                        "true" | "yes" | "1"
                    );
                }
                "pollingcycle" | "polling_cycle_ms" => {
                    properties.polling_cycle_ms = value
                        .trim()
                        .parse()
                        .map_err(|_| CoreError::invalid_property(key, value))?;
                }
                _ => {}
            }
        }
        Ok(properties)
    }

    /// Check that the mandatory properties are present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidProperty`] naming the missing property.
    pub fn validate(&self) -> Result<()> {
        if self.controller.is_empty() {
            return Err(CoreError::invalid_property(
                "controller",
                "no parent controller device configured",
            ));
        }
        if self.channels.is_empty() {
            return Err(CoreError::invalid_property(
                "channels",
                "no controller attribute configured",
            ));
        }
        if self.channel_name().is_none() {
            return Err(CoreError::invalid_property(
                "channels",
                "no pressure channel among the configured attributes",
            ));
        }
        Ok(())
    }

    /// The pressure channel: first configured attribute not named like a
    /// state.
    pub fn channel_name(&self) -> Option<&str> {
        self.channels
            .iter()
            .map(String::as_str)
            .find(|c| !c.to_lowercase().contains("state"))
    }

    /// Fallback polling cycle as a duration.
    pub fn polling_cycle(&self) -> Duration {
        Duration::from_millis(self.polling_cycle_ms)
    }
}
