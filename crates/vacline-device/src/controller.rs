//! Serial controller device.
//!
//! Owns the running polling engine for one controller box and exposes the
//! operator surface: registering commands, queueing writes, reading the
//! published snapshot, and dumping the black box. It can also synthesize
//! notifications from the snapshot for channel devices that do not receive
//! events (the `use_events = false` fallback).

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;
use vacline_channel::{EventSource, Notification};
use vacline_core::parse::first_number;
use vacline_core::{AttrValue, AttributeSample, Quality, Result};
use vacline_serial::{BlackBox, PollerConfig, PollerHandle, PollingEngine, SerialPort, SerialTransport};

/// A vacuum controller box spoken to over one serial line.
pub struct SerialController {
    name: String,
    poller: PollerHandle,
    black_box: BlackBox,
}

impl SerialController {
    /// Build the transport and start polling.
    ///
    /// `name` is the device name (`domain/family/member`); `line` names the
    /// serial collaborator for error messages.
    pub fn start<P: SerialPort + 'static>(
        name: impl Into<String>,
        line: impl Into<String>,
        port: P,
        config: PollerConfig,
        black_box_capacity: usize,
    ) -> Self {
        let name = name.into();
        let black_box = BlackBox::new(black_box_capacity);
        let transport = SerialTransport::new(port, line).with_black_box(black_box.clone());
        let poller = PollingEngine::new(transport, config).start();
        info!(device = %name, "serial controller started");
        Self {
            name,
            poller,
            black_box,
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a read command; `None` means read every cycle.
    pub fn add_command(&self, command: impl Into<String>, period: Option<Duration>) {
        self.poller.add_read(command, period);
    }

    /// Queue a write command for the next cycle.
    ///
    /// Re-sending the same command before it went out replaces the pending
    /// copy; only the latest setpoint reaches the line.
    pub fn send_write(&self, command: impl Into<String>) {
        self.poller.push_write(command);
    }

    /// Enable, retune or disable polling for a command; a zero or absent
    /// period removes the command from the table.
    pub fn set_polled(&self, command: &str, period: Option<Duration>) -> bool {
        self.poller.set_polled(command, period)
    }

    /// Last published reply for a read command.
    pub fn cached(&self, command: &str) -> Option<String> {
        self.poller.result_of(command)
    }

    /// First number in the last published reply, if any.
    pub fn cached_number(&self, command: &str) -> Option<f64> {
        self.cached(command).and_then(|r| first_number(&r))
    }

    /// Human-readable error report.
    pub fn report(&self) -> String {
        self.poller.report()
    }

    /// Dump the black box next to `prefix`; returns the path written.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the dump cannot be written.
    pub fn save_black_box(&self, prefix: impl AsRef<Path>) -> Result<PathBuf> {
        self.black_box.save(prefix)
    }

    /// Synthesize a notification for one command from the snapshot.
    ///
    /// Fallback for channel devices running without events: a numeric reply
    /// becomes a value notification for `attribute`, anything else an error
    /// notification.
    ///
    /// # Errors
    ///
    /// Fails only when `attribute` does not yield a valid source under this
    /// device's name.
    pub fn snapshot_notification(&self, attribute: &str, command: &str) -> Result<Notification> {
        let source = EventSource::parse(&format!("{}/{}", self.name, attribute))?;
        match self.cached(command) {
            Some(reply) => match first_number(&reply) {
                Some(value) => Ok(Notification::value(
                    source,
                    AttributeSample::new(attribute, AttrValue::Number(value), Quality::Valid),
                )),
                None => Ok(Notification::error(
                    source,
                    format!("no number in reply to '{}': {}", command, reply),
                )),
            },
            None => Ok(Notification::error(
                source,
                format!("no reply cached for '{}'", command),
            )),
        }
    }

    /// Stop the polling engine.
    pub async fn stop(self) {
        self.poller.stop().await;
        info!(device = %self.name, "serial controller stopped");
    }
}
