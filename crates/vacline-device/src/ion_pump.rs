//! Ion-pump channel device.
//!
//! Wraps a [`StateAggregator`] with the pressure classifier and the
//! operator surface of one pump channel: the pressure reading with its
//! quality, the status text and the on/off commands.

use chrono::{DateTime, Utc};
use tracing::info;
use vacline_channel::{
    Notification, PressureChannelClassifier, StateAggregator, StateChange,
};
use vacline_core::{CoreError, DeviceState, Quality, Result};

use crate::properties::IonPumpProperties;

/// One ion-pump channel fed by notifications from its parent controller.
pub struct IonPump {
    name: String,
    properties: IonPumpProperties,
    aggregator: StateAggregator<PressureChannelClassifier>,
    init_error: Option<String>,
}

impl IonPump {
    /// Create the device.
    ///
    /// Invalid properties do not fail construction: the device comes up in
    /// FAULT with the problem in its status, so a misconfigured channel is
    /// visible instead of absent.
    pub fn new(name: impl Into<String>, properties: IonPumpProperties) -> Self {
        let name = name.into();
        let channel = properties.channel_name().unwrap_or("pressure").to_string();
        let classifier = PressureChannelClassifier::new(channel.clone(), properties.low_range);
        let mut aggregator = StateAggregator::new(channel, classifier);

        let init_error = match properties.validate() {
            Ok(()) => None,
            Err(e) => {
                let message = e.to_string();
                aggregator.force_state(DeviceState::Fault, message.clone());
                Some(message)
            }
        };
        info!(device = %name, controller = %properties.controller, "ion pump created");

        Self {
            name,
            properties,
            aggregator,
            init_error,
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static configuration.
    pub fn properties(&self) -> &IonPumpProperties {
        &self.properties
    }

    /// Current device state.
    pub fn state(&self) -> DeviceState {
        self.aggregator.state()
    }

    /// Feed one notification from the parent controller.
    pub fn handle_notification(&mut self, notification: &Notification) -> Option<StateChange> {
        self.aggregator.on_notification(notification)
    }

    /// Force FAULT if the event stream has gone silent.
    pub fn check_staleness(&mut self, now: DateTime<Utc>) -> Option<StateChange> {
        self.aggregator.check_staleness(now)
    }

    /// Whether the pressure can currently be read.
    ///
    /// It cannot while the channel is off, disabled or out of touch with
    /// the hardware.
    pub fn is_pressure_readable(&self) -> bool {
        !matches!(
            self.state(),
            DeviceState::Init | DeviceState::Unknown | DeviceState::Off | DeviceState::Disable
        )
    }

    /// Latest pressure with its timestamp and quality.
    ///
    /// Quality follows the state: ON reads valid, ALARM alarmed, STANDBY is
    /// a warning (the value sits at the bottom of the gauge's range), and
    /// everything else invalid.
    ///
    /// # Errors
    ///
    /// Fails when the state forbids reading or no numeric value is cached.
    pub fn read_pressure(&self) -> Result<(f64, DateTime<Utc>, Quality)> {
        if !self.is_pressure_readable() {
            return Err(CoreError::other(format!(
                "pressure not readable while {} is {}",
                self.name,
                self.state()
            )));
        }
        let channel = self.channel();
        let sample = self
            .aggregator
            .sample(&channel)
            .ok_or_else(|| CoreError::empty_response(&channel))?;
        let value = sample
            .value
            .as_number()
            .ok_or_else(|| CoreError::unparsable(&channel, sample.value.to_string()))?;

        let quality = match self.state() {
            DeviceState::On => Quality::Valid,
            DeviceState::Alarm => Quality::Alarm,
            DeviceState::Standby => Quality::Warning,
            _ => Quality::Invalid,
        };
        Ok((value, sample.timestamp, quality))
    }

    /// One-line channel summary: the pressure when pumping, the state name
    /// otherwise.
    pub fn channel_status(&self) -> String {
        match self.read_pressure() {
            Ok((value, _, _)) if self.state() == DeviceState::On => {
                format!("{:3.2e} mbar", value)
            }
            _ => self.state().to_string(),
        }
    }

    /// Multi-line device status.
    pub fn status(&self) -> String {
        let mut lines = Vec::new();
        if let Some(init_error) = &self.init_error {
            lines.push(format!("Initialisation failed: {}", init_error));
        }
        if let Some(state_error) = self.aggregator.state_error() {
            lines.push(state_error.to_string());
        }
        lines.push(self.channel_status());
        lines.push(self.aggregator.state_reason().to_string());
        if !self.properties.description.is_empty() {
            lines.push(self.properties.description.clone());
        }
        lines.push(format!(
            "Last event at {}",
            self.aggregator
                .last_event_at()
                .format("%Y-%m-%d %H:%M:%S")
        ));
        lines.join("\n")
    }

    /// Consecutive error count for the pressure channel.
    pub fn channel_errors(&self) -> u32 {
        self.aggregator.errors_for(&self.channel())
    }

    /// Human-readable error summary.
    pub fn error_report(&self) -> String {
        self.aggregator.error_report()
    }

    /// Operator command: mark the channel on.
    pub fn switch_on(&mut self) -> Option<StateChange> {
        self.aggregator
            .force_state(DeviceState::On, "switched on by operator")
    }

    /// Operator command: mark the channel disabled.
    ///
    /// An operator switch-off is an interlock, so the channel lands in
    /// DISABLE rather than OFF.
    pub fn switch_off(&mut self) -> Option<StateChange> {
        self.aggregator
            .force_state(DeviceState::Disable, "switched off by operator")
    }

    fn channel(&self) -> String {
        self.properties
            .channel_name()
            .unwrap_or("pressure")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vacline_channel::EventSource;
    use vacline_core::{AttrValue, AttributeSample};

    fn properties() -> IonPumpProperties {
        IonPumpProperties {
            controller: "lab/vc/dual01".to_string(),
            channels: vec!["P1".to_string()],
            description: "ring section 3 pump".to_string(),
            ..IonPumpProperties::default()
        }
    }

    fn pressure(value: f64, quality: Quality) -> Notification {
        Notification::value(
            EventSource::parse("lab/vc/dual01/P1").unwrap(),
            AttributeSample::new("P1", AttrValue::Number(value), quality),
        )
    }

    #[test]
    fn test_pressure_read_follows_the_state() {
        let mut pump = IonPump::new("lab/ip/01", properties());
        assert!(!pump.is_pressure_readable());
        assert!(pump.read_pressure().is_err());

        pump.handle_notification(&pressure(1e-9, Quality::Valid));
        let (value, _, quality) = pump.read_pressure().unwrap();
        assert_eq!(value, 1e-9);
        assert_eq!(quality, Quality::Valid);

        pump.handle_notification(&pressure(5e-13, Quality::Valid));
        let (_, _, quality) = pump.read_pressure().unwrap();
        assert_eq!(quality, Quality::Warning);

        pump.handle_notification(&pressure(1e-5, Quality::Alarm));
        let (_, _, quality) = pump.read_pressure().unwrap();
        assert_eq!(quality, Quality::Alarm);
    }

    #[test]
    fn test_channel_status_shows_pressure_when_on() {
        let mut pump = IonPump::new("lab/ip/01", properties());
        pump.handle_notification(&pressure(1.23e-8, Quality::Valid));
        assert_eq!(pump.channel_status(), "1.23e-8 mbar");

        pump.handle_notification(&pressure(5e-13, Quality::Valid));
        assert_eq!(pump.channel_status(), "STANDBY");
    }

    #[test]
    fn test_status_concatenates_the_pieces() {
        let mut pump = IonPump::new("lab/ip/01", properties());
        pump.handle_notification(&pressure(1e-9, Quality::Valid));
        let status = pump.status();
        assert!(status.contains("mbar"));
        assert!(status.contains("ring section 3 pump"));
        assert!(status.contains("Last event at"));
    }

    #[test]
    fn test_invalid_properties_fault_the_device() {
        let pump = IonPump::new("lab/ip/01", IonPumpProperties::default());
        assert_eq!(pump.state(), DeviceState::Fault);
        assert!(pump.status().contains("Initialisation failed"));
    }

    #[test]
    fn test_switch_commands() {
        let mut pump = IonPump::new("lab/ip/01", properties());
        pump.handle_notification(&pressure(1e-9, Quality::Valid));

        let change = pump.switch_off().unwrap();
        assert_eq!(change.to, DeviceState::Disable);
        assert!(!pump.is_pressure_readable());

        let change = pump.switch_on().unwrap();
        assert_eq!(change.to, DeviceState::On);
        assert!(pump.is_pressure_readable());
    }
}
