//! Core value types for vacuum-equipment devices.
//!
//! A device publishes a coarse [`DeviceState`], and each of its attributes is
//! cached as an [`AttributeSample`]: last-known value, timestamp and quality.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Coarse operational state of a device instance.
///
/// `Init` and `Unknown` are the "communication not trustworthy" sentinels:
/// while the upstream parent device sits in one of them, incoming events are
/// ignored for every attribute except the parent's own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Device is initialising; values are not trustworthy yet.
    Init,

    /// Everything works fine.
    On,

    /// Pressure warning or interlock.
    Alarm,

    /// Measured value at or below the low range.
    Standby,

    /// It is impossible to communicate with the device.
    Unknown,

    /// Hardware fault or stale event stream.
    Fault,

    /// Channel switched off.
    Off,

    /// Manual interlock.
    Disable,
}

impl DeviceState {
    /// Whether values coming from a parent in this state can be trusted.
    pub fn is_untrusted(&self) -> bool {
        matches!(self, Self::Init | Self::Unknown)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Init => "INIT",
            DeviceState::On => "ON",
            DeviceState::Alarm => "ALARM",
            DeviceState::Standby => "STANDBY",
            DeviceState::Unknown => "UNKNOWN",
            DeviceState::Fault => "FAULT",
            DeviceState::Off => "OFF",
            DeviceState::Disable => "DISABLE",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for DeviceState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INIT" => Ok(DeviceState::Init),
            "ON" => Ok(DeviceState::On),
            "ALARM" => Ok(DeviceState::Alarm),
            "STANDBY" => Ok(DeviceState::Standby),
            "UNKNOWN" => Ok(DeviceState::Unknown),
            "FAULT" => Ok(DeviceState::Fault),
            "OFF" => Ok(DeviceState::Off),
            "DISABLE" => Ok(DeviceState::Disable),
            other => Err(CoreError::unparsable("state", other)),
        }
    }
}

/// Confidence flag on a sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Value is trustworthy.
    Valid,

    /// Value crossed an alarm limit.
    Alarm,

    /// Value crossed a warning limit.
    Warning,

    /// Value cannot be trusted (stale, unreadable, device off).
    Invalid,
}

/// Last-known value of one attribute.
///
/// `Null` is the error sentinel for numeric attributes; status-like string
/// attributes use `Text("UNKNOWN")` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    /// No value available.
    Null,

    /// Scalar numeric value.
    Number(f64),

    /// Spectrum value; channel devices pick one element by ordinal.
    NumberArray(Vec<f64>),

    /// Free-text value (status strings).
    Text(String),

    /// A device state carried as an attribute value.
    State(DeviceState),
}

impl AttrValue {
    /// Scalar numeric view of the value, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::NumberArray(v) => v.first().copied(),
            _ => None,
        }
    }

    /// Device-state view of the value, if any.
    pub fn as_state(&self) -> Option<DeviceState> {
        match self {
            AttrValue::State(s) => Some(*s),
            AttrValue::Text(t) => t.parse().ok(),
            _ => None,
        }
    }

    /// Element of a spectrum value by ordinal; scalars ignore the ordinal.
    pub fn element(&self, ordinal: usize) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::NumberArray(v) => v.get(ordinal).copied(),
            _ => None,
        }
    }

    /// Whether this is the null sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => write!(f, "None"),
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::NumberArray(v) => write!(f, "{:?}", v),
            AttrValue::Text(t) => write!(f, "{}", t),
            AttrValue::State(s) => write!(f, "{}", s),
        }
    }
}

/// One cached attribute reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSample {
    /// Attribute name as delivered by the notification source.
    pub name: String,

    /// Last-known value.
    pub value: AttrValue,

    /// When the value was produced.
    pub timestamp: DateTime<Utc>,

    /// Confidence flag attached to the value.
    pub quality: Quality,
}

impl AttributeSample {
    /// Create a sample timestamped now.
    pub fn new(name: impl Into<String>, value: AttrValue, quality: Quality) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp: Utc::now(),
            quality,
        }
    }

    /// Create a sample with an explicit timestamp.
    pub fn at(
        name: impl Into<String>,
        value: AttrValue,
        quality: Quality,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            timestamp,
            quality,
        }
    }

    /// Placeholder sample used to seed caches before the first event.
    ///
    /// Carries the null value, epoch timestamp and `Invalid` quality.
    pub fn seed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: AttrValue::Null,
            timestamp: Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now),
            quality: Quality::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_roundtrip() {
        for state in [
            DeviceState::Init,
            DeviceState::On,
            DeviceState::Alarm,
            DeviceState::Standby,
            DeviceState::Unknown,
            DeviceState::Fault,
            DeviceState::Off,
            DeviceState::Disable,
        ] {
            let parsed: DeviceState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn test_state_parse_is_case_insensitive() {
        assert_eq!("on".parse::<DeviceState>().unwrap(), DeviceState::On);
        assert_eq!(" Fault ".parse::<DeviceState>().unwrap(), DeviceState::Fault);
        assert!("MOVING".parse::<DeviceState>().is_err());
    }

    #[test]
    fn test_untrusted_states() {
        assert!(DeviceState::Init.is_untrusted());
        assert!(DeviceState::Unknown.is_untrusted());
        assert!(!DeviceState::On.is_untrusted());
        assert!(!DeviceState::Fault.is_untrusted());
    }

    #[test]
    fn test_attr_value_views() {
        assert_eq!(AttrValue::Number(1.5).as_number(), Some(1.5));
        assert_eq!(
            AttrValue::NumberArray(vec![1.0, 2.0, 3.0]).element(2),
            Some(3.0)
        );
        assert_eq!(AttrValue::Number(4.2).element(7), Some(4.2));
        assert_eq!(
            AttrValue::Text("ON".into()).as_state(),
            Some(DeviceState::On)
        );
        assert!(AttrValue::Null.is_null());
        assert_eq!(AttrValue::Null.as_number(), None);
    }

    #[test]
    fn test_seed_sample_is_invalid_at_epoch() {
        let sample = AttributeSample::seed("pressure");
        assert!(sample.value.is_null());
        assert_eq!(sample.quality, Quality::Invalid);
        assert_eq!(sample.timestamp.timestamp(), 0);
    }

    #[test]
    fn test_state_serde_snake_case() {
        let json = serde_json::to_string(&DeviceState::Standby).unwrap();
        assert_eq!(json, "\"standby\"");
    }
}
