//! Default timings and thresholds for the vacline engines.
//!
//! The values mirror the behaviour of the slow vacuum controllers these
//! crates talk to: serial exchanges are bounded in the tens of milliseconds,
//! and event streams are expected at least every few minutes.

use std::time::Duration;

/// Consecutive errors tolerated on one attribute before its cached value is
/// reset to the error sentinel and the device state forced to UNKNOWN.
pub const MAX_ERRORS: u32 = 3;

/// Maximum silence on the event stream before the device is forced to FAULT.
pub const STALENESS_WINDOW: Duration = Duration::from_secs(300);

/// Floor for the pause between two serial communications.
pub const MIN_PAUSE: Duration = Duration::from_millis(20);

/// Window over which the serial error rate is accumulated before reset.
pub const ERROR_RATE_WINDOW: Duration = Duration::from_secs(3600);

/// Characters stripped from the edges of a serial reply.
///
/// `>` is the prompt some controllers append after every answer.
pub const BLANK_CHARS: [char; 4] = ['\n', '\r', ' ', '>'];

/// Number of sub-intervals the receive timeout is split into.
pub const RECEIVE_SLICES: u32 = 4;

/// Default number of retries for a read command.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default maximum wait for an answer from the serial line.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(2);

/// Default period for refreshing the whole read-command list.
pub const DEFAULT_CYCLE: Duration = Duration::from_millis(100);

/// Pressure values at or below this default are reported as STANDBY.
pub const DEFAULT_LOW_RANGE: f64 = 1.0e-12;

/// Default polling cycle for channel devices.
pub const DEFAULT_POLLING_CYCLE: Duration = Duration::from_secs(3);
