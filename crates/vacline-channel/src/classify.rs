//! State classifiers.
//!
//! A classifier turns one attribute sample into a candidate device state.
//! It is pure bookkeeping-free logic; the aggregator owns hysteresis, error
//! counting and commit. A classifier failure is a `Result::Err`, which the
//! aggregator folds into the error counters instead of letting it poison
//! the event loop.

use tracing::warn;
use vacline_core::parse::channel_base;
use vacline_core::{AttributeSample, DeviceState, Quality, Result};

/// Maps an attribute sample to a candidate device state.
pub trait StateClassifier: Send {
    /// Classify one sample. `current` is the device state before the event,
    /// for classifiers that only react to some attributes.
    fn classify(
        &self,
        attribute: &str,
        sample: &AttributeSample,
        current: DeviceState,
    ) -> Result<DeviceState>;
}

/// Classifier for one pressure channel of a vacuum controller.
///
/// Alarm or warning quality wins outright; otherwise the numeric value is
/// compared against the low range: at or below it the channel is pumping on
/// nothing and reports STANDBY, above it ON. A sample with no usable number
/// classifies as UNKNOWN, which feeds the aggregator's hysteresis.
#[derive(Debug, Clone)]
pub struct PressureChannelClassifier {
    channel: String,
    low_range: f64,
}

impl PressureChannelClassifier {
    pub fn new(channel: impl Into<String>, low_range: f64) -> Self {
        Self {
            channel: channel.into(),
            low_range,
        }
    }

    /// Channel attribute this classifier reacts to, brackets stripped.
    pub fn channel(&self) -> &str {
        channel_base(&self.channel)
    }

    /// Low-range threshold in the channel's unit.
    pub fn low_range(&self) -> f64 {
        self.low_range
    }
}

impl StateClassifier for PressureChannelClassifier {
    fn classify(
        &self,
        attribute: &str,
        sample: &AttributeSample,
        current: DeviceState,
    ) -> Result<DeviceState> {
        if !attribute.eq_ignore_ascii_case(self.channel()) {
            warn!(attribute, channel = %self.channel, "sample for a foreign attribute");
            return Ok(current);
        }

        if matches!(sample.quality, Quality::Alarm | Quality::Warning) {
            return Ok(DeviceState::Alarm);
        }

        match sample.value.as_number() {
            None => Ok(DeviceState::Unknown),
            Some(value) if value <= self.low_range => Ok(DeviceState::Standby),
            Some(_) => Ok(DeviceState::On),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vacline_core::AttrValue;

    fn classifier() -> PressureChannelClassifier {
        PressureChannelClassifier::new("P1", 1.0e-12)
    }

    fn sample(value: AttrValue, quality: Quality) -> AttributeSample {
        AttributeSample::new("p1", value, quality)
    }

    #[test]
    fn test_pressure_above_low_range_is_on() {
        let state = classifier()
            .classify("p1", &sample(AttrValue::Number(1e-9), Quality::Valid), DeviceState::Init)
            .unwrap();
        assert_eq!(state, DeviceState::On);
    }

    #[test]
    fn test_pressure_at_or_below_low_range_is_standby() {
        let c = classifier();
        let at = sample(AttrValue::Number(1.0e-12), Quality::Valid);
        let below = sample(AttrValue::Number(1.0e-13), Quality::Valid);
        assert_eq!(c.classify("p1", &at, DeviceState::On).unwrap(), DeviceState::Standby);
        assert_eq!(c.classify("p1", &below, DeviceState::On).unwrap(), DeviceState::Standby);
    }

    #[test]
    fn test_alarm_quality_wins_over_value() {
        let c = classifier();
        let alarmed = sample(AttrValue::Number(1e-9), Quality::Alarm);
        let warned = sample(AttrValue::Number(1e-9), Quality::Warning);
        assert_eq!(c.classify("p1", &alarmed, DeviceState::On).unwrap(), DeviceState::Alarm);
        assert_eq!(c.classify("p1", &warned, DeviceState::On).unwrap(), DeviceState::Alarm);
    }

    #[test]
    fn test_null_value_is_unknown() {
        let state = classifier()
            .classify("p1", &sample(AttrValue::Null, Quality::Valid), DeviceState::On)
            .unwrap();
        assert_eq!(state, DeviceState::Unknown);
    }

    #[test]
    fn test_foreign_attribute_keeps_the_current_state() {
        let state = classifier()
            .classify(
                "temperature",
                &sample(AttrValue::Number(300.0), Quality::Valid),
                DeviceState::Standby,
            )
            .unwrap();
        assert_eq!(state, DeviceState::Standby);
    }

    #[test]
    fn test_bracketed_channel_matches_its_base() {
        let c = PressureChannelClassifier::new("Pressures[2]", 1.0e-12);
        assert_eq!(c.channel(), "Pressures");
        let state = c
            .classify(
                "pressures",
                &sample(AttrValue::Number(5e-10), Quality::Valid),
                DeviceState::Init,
            )
            .unwrap();
        assert_eq!(state, DeviceState::On);
    }
}
