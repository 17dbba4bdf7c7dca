//! Request/response transport over a serial port.
//!
//! One exchange is: probe the line, open, flush, write the command with its
//! terminator, read reply chunks until quiescence or timeout, clean the
//! reply (trailing prompt characters, local echo, leading blanks), close.
//!
//! Some controllers need a confirmation dialogue after the main command;
//! those are expressed as [`PostCommand`]s with their expected ACK/NACK
//! replies.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use vacline_core::constants::{BLANK_CHARS, DEFAULT_WAIT, RECEIVE_SLICES};
use vacline_core::{CoreError, ErrorAccounting, Result};

use crate::blackbox::BlackBox;
use crate::port::SerialPort;

/// Error accounting shared between the transport, the poller and clients.
pub type SharedAccounting = Arc<Mutex<ErrorAccounting>>;

/// Bookkeeping of the latest exchange, shared with whoever reports on the
/// line after the transport has moved into the polling task.
#[derive(Debug, Clone, Default)]
pub struct CommsStatus {
    /// Last command sent, if any.
    pub last_sent: Option<String>,

    /// Last cleaned reply, if any.
    pub last_received: Option<String>,

    /// When the last exchange finished.
    pub last_exchange_at: Option<DateTime<Utc>>,

    /// Longest receive observed so far.
    pub max_read_time: Duration,

    /// Exchanges completed (successfully or not) so far.
    pub exchanges: u64,
}

impl CommsStatus {
    /// One-line summary of the latest traffic.
    pub fn summary(&self) -> String {
        match (&self.last_exchange_at, &self.last_sent) {
            (Some(at), Some(sent)) => format!(
                "Comms at {}: \"{}\" -> \"{}\" ({} exchanges, max read {} ms)",
                at.format("%H:%M:%S"),
                sent,
                self.last_received.as_deref().unwrap_or(""),
                self.exchanges,
                self.max_read_time.as_millis()
            ),
            _ => "Comms: no exchange yet".to_string(),
        }
    }
}

/// Comms bookkeeping shared between the transport and report consumers.
pub type SharedComms = Arc<Mutex<CommsStatus>>;

pub(crate) fn lock_comms(comms: &SharedComms) -> std::sync::MutexGuard<'_, CommsStatus> {
    match comms.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A confirmation command sent after the main command.
///
/// The reply to the previous step is checked first: the NACK reply aborts
/// the dialogue (the raw reply is returned so the caller sees the refusal),
/// any reply other than the ACK is logged and counted but the dialogue
/// continues.
#[derive(Debug, Clone)]
pub struct PostCommand {
    /// Command to send.
    pub command: String,

    /// Reply that confirms the previous step.
    pub ack: String,

    /// Reply that refuses the previous step.
    pub nack: String,
}

impl PostCommand {
    pub fn new(
        command: impl Into<String>,
        ack: impl Into<String>,
        nack: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            ack: ack.into(),
            nack: nack.into(),
        }
    }
}

/// Serial request/response transport.
///
/// Generic over the port so tests run against [`MockSerialPort`]
/// (crate::mock::MockSerialPort) and deployments against the TTY driver.
pub struct SerialTransport<P: SerialPort> {
    port: P,
    name: String,
    wait_time: Duration,
    comms: SharedComms,
    black_box: Option<BlackBox>,
    accounting: Option<SharedAccounting>,
}

impl<P: SerialPort> SerialTransport<P> {
    /// Create a transport with the default receive timeout.
    pub fn new(port: P, name: impl Into<String>) -> Self {
        Self {
            port,
            name: name.into(),
            wait_time: DEFAULT_WAIT,
            comms: Arc::new(Mutex::new(CommsStatus::default())),
            black_box: None,
            accounting: None,
        }
    }

    /// Set the maximum wait for a reply.
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Attach a black-box ring that records every exchange.
    pub fn with_black_box(mut self, black_box: BlackBox) -> Self {
        self.black_box = Some(black_box);
        self
    }

    /// Attach shared error accounting for failed exchanges.
    pub fn with_accounting(mut self, accounting: SharedAccounting) -> Self {
        self.accounting = Some(accounting);
        self
    }

    /// Name of the serial line collaborator.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum wait for a reply.
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// Shared comms bookkeeping; survives the transport moving into the
    /// polling task.
    pub fn comms(&self) -> SharedComms {
        Arc::clone(&self.comms)
    }

    /// Snapshot of the latest exchange bookkeeping.
    pub fn comms_status(&self) -> CommsStatus {
        lock_comms(&self.comms).clone()
    }

    /// Last command sent, if any.
    pub fn last_sent(&self) -> Option<String> {
        lock_comms(&self.comms).last_sent.clone()
    }

    /// Last cleaned reply, if any.
    pub fn last_received(&self) -> Option<String> {
        lock_comms(&self.comms).last_received.clone()
    }

    /// When the last exchange finished.
    pub fn last_exchange_at(&self) -> Option<DateTime<Utc>> {
        lock_comms(&self.comms).last_exchange_at
    }

    /// Longest receive observed so far.
    pub fn max_read_time(&self) -> Duration {
        lock_comms(&self.comms).max_read_time
    }

    /// Exchanges completed (successfully or not) so far.
    pub fn exchanges(&self) -> u64 {
        lock_comms(&self.comms).exchanges
    }

    /// Run one full exchange: command, reply, optional confirmation dialogue.
    ///
    /// Returns the cleaned reply of the last step. A NACK reply to any step
    /// short-circuits the dialogue and is returned as-is so the caller sees
    /// the refusal.
    ///
    /// # Errors
    ///
    /// - [`CoreError::TransportUnavailable`] when the liveness probe fails;
    ///   the last-sent/last-received bookkeeping is cleared so stale values
    ///   never outlive a dead line.
    /// - [`CoreError::ReadTimeout`] when nothing arrives before the timeout.
    /// - [`CoreError::EmptyResponse`] when the reply cleans down to nothing.
    pub async fn serial_comm(&mut self, command: &str, post: &[PostCommand]) -> Result<String> {
        if !self.port.probe().await? {
            let mut comms = lock_comms(&self.comms);
            comms.last_sent = None;
            comms.last_received = None;
            drop(comms);
            if let Some(bb) = &self.black_box {
                bb.record(command, "serial line not available");
            }
            return Err(CoreError::transport_unavailable(&self.name));
        }

        self.port.open().await?;
        let result = self.dialogue(command, post).await;
        self.port.close().await.ok();

        let mut comms = lock_comms(&self.comms);
        comms.exchanges += 1;
        comms.last_exchange_at = Some(Utc::now());
        if let Ok(reply) = &result {
            comms.last_sent = Some(command.to_string());
            comms.last_received = Some(reply.clone());
        }
        drop(comms);
        match &result {
            Ok(reply) => {
                if let Some(bb) = &self.black_box {
                    bb.record(command, reply.clone());
                }
            }
            Err(e) => {
                if let Some(bb) = &self.black_box {
                    bb.record(command, e.to_string());
                }
            }
        }
        result
    }

    async fn dialogue(&mut self, command: &str, post: &[PostCommand]) -> Result<String> {
        let mut reply = self.exchange(command).await?;

        for pc in post {
            if reply == pc.nack {
                debug!(command, reply = %reply, "dialogue refused, returning raw reply");
                return Ok(reply);
            }
            if reply != pc.ack {
                warn!(
                    command,
                    expected = %pc.ack,
                    got = %reply,
                    "unexpected reply in confirmation dialogue"
                );
                if let Some(acc) = &self.accounting {
                    if let Ok(mut acc) = acc.lock() {
                        acc.record(format!(
                            "unexpected reply to '{}': expected '{}', got '{}'",
                            command, pc.ack, reply
                        ));
                    }
                }
            }
            reply = self.exchange(&pc.command).await?;
        }
        Ok(reply)
    }

    /// Send one command and receive its cleaned reply.
    async fn exchange(&mut self, command: &str) -> Result<String> {
        self.port.flush_input().await?;
        self.port.flush_output().await?;

        let mut framed = command.to_string();
        framed.push('\r');
        self.port.write_raw(framed.as_bytes()).await?;

        let started = std::time::Instant::now();
        let raw = self.receive(command).await?;
        let elapsed = started.elapsed();
        {
            let mut comms = lock_comms(&self.comms);
            if elapsed > comms.max_read_time {
                comms.max_read_time = elapsed;
            }
        }

        let cleaned = clean_reply(command, &raw);
        if cleaned.is_empty() {
            return Err(CoreError::empty_response(command));
        }
        debug!(command, reply = %cleaned, "serial exchange");
        Ok(cleaned)
    }

    /// Sliced receive: wait in sub-intervals, stop early once a chunk comes
    /// back empty after a meaningful payload has been seen.
    async fn receive(&mut self, command: &str) -> Result<String> {
        let slice = (self.wait_time / RECEIVE_SLICES).max(Duration::from_millis(1));
        let mut buffer = String::new();
        let mut waited = Duration::ZERO;

        loop {
            let chunk = self.port.read_raw(slice).await?;
            waited += slice;
            let quiet = chunk.is_empty();
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            if quiet && has_payload(&buffer, command) {
                break;
            }
            if waited >= self.wait_time {
                break;
            }
        }

        if buffer.is_empty() {
            return Err(CoreError::read_timeout(
                command,
                self.wait_time.as_millis() as u64,
            ));
        }
        Ok(buffer)
    }
}

/// Whether the buffer contains anything beyond the command echo and blanks.
fn has_payload(buffer: &str, command: &str) -> bool {
    let without_echo = match buffer.find(command) {
        Some(idx) if !command.is_empty() => {
            let mut rest = String::with_capacity(buffer.len());
            rest.push_str(&buffer[..idx]);
            rest.push_str(&buffer[idx + command.len()..]);
            rest
        }
        _ => buffer.to_string(),
    };
    without_echo.chars().any(|c| !BLANK_CHARS.contains(&c))
}

/// Strip trailing prompt characters, then the local echo of the command,
/// then leading blanks.
fn clean_reply(command: &str, raw: &str) -> String {
    let mut cleaned = raw.trim_end_matches(|c| BLANK_CHARS.contains(&c));

    if !command.is_empty() && cleaned.contains(command) {
        let mut rest = cleaned.chars();
        for expected in command.chars() {
            match rest.clone().next() {
                Some(c) if c == expected => {
                    rest.next();
                }
                _ => break,
            }
        }
        cleaned = rest.as_str();
    }

    cleaned
        .trim_start_matches(|c| BLANK_CHARS.contains(&c))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSerialPort;

    #[test]
    fn test_clean_reply_strips_echo_and_blanks() {
        assert_eq!(clean_reply("PZ", "PZ 1.23E-08mbar\r\n"), "1.23E-08mbar");
        assert_eq!(clean_reply("ST", "ST RUNNING\r\n> "), "RUNNING");
        assert_eq!(clean_reply("PZ", "1.23E-08mbar\r\n"), "1.23E-08mbar");
    }

    #[test]
    fn test_clean_reply_partial_echo() {
        // Echo strip stops at the first mismatch.
        assert_eq!(clean_reply("ABC", "ABX ABC\r\n"), "X ABC");
    }

    #[test]
    fn test_has_payload_ignores_echo() {
        assert!(!has_payload("PZ\r\n", "PZ"));
        assert!(has_payload("PZ 1.2e-9\r\n", "PZ"));
        assert!(!has_payload("\r\n ", "PZ"));
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let (port, handle) = MockSerialPort::new("mock");
        handle.script_reply("PZ", "PZ 1.23E-08mbar\r\n");

        let mut transport = SerialTransport::new(port, "mock");
        let reply = transport.serial_comm("PZ", &[]).await.unwrap();
        assert_eq!(reply, "1.23E-08mbar");
        assert_eq!(transport.last_sent().as_deref(), Some("PZ"));
        assert_eq!(transport.last_received().as_deref(), Some("1.23E-08mbar"));
    }

    #[tokio::test]
    async fn test_chunked_reply_is_reassembled() {
        let (port, handle) = MockSerialPort::new("mock");
        handle.script_chunks("ST", &["ST RUN", "NING\r\n"]);

        let mut transport = SerialTransport::new(port, "mock");
        assert_eq!(transport.serial_comm("ST", &[]).await.unwrap(), "RUNNING");
    }

    #[tokio::test]
    async fn test_unreachable_line_clears_bookkeeping() {
        let (port, handle) = MockSerialPort::new("mock");
        handle.script_reply("PZ", "PZ 1e-9\r\n");

        let mut transport = SerialTransport::new(port, "lab/serial/tty01");
        transport.serial_comm("PZ", &[]).await.unwrap();
        assert!(transport.last_sent().is_some());

        handle.set_reachable(false);
        let err = transport.serial_comm("PZ", &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::TransportUnavailable { .. }));
        assert_eq!(transport.last_sent(), None);
        assert_eq!(transport.last_received(), None);
        // The shared snapshot sees the same clearing.
        assert!(transport.comms_status().last_sent.is_none());
    }

    #[tokio::test]
    async fn test_silence_times_out() {
        let (port, _handle) = MockSerialPort::new("mock");
        let mut transport =
            SerialTransport::new(port, "mock").with_wait_time(Duration::from_millis(8));
        let err = transport.serial_comm("PZ", &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::ReadTimeout { .. }));
    }

    #[tokio::test]
    async fn test_echo_only_reply_is_empty_response() {
        let (port, handle) = MockSerialPort::new("mock");
        handle.script_reply("PZ", "PZ\r\n");

        let mut transport =
            SerialTransport::new(port, "mock").with_wait_time(Duration::from_millis(8));
        let err = transport.serial_comm("PZ", &[]).await.unwrap_err();
        assert!(matches!(err, CoreError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn test_nack_short_circuits_dialogue() {
        let (port, handle) = MockSerialPort::new("mock");
        handle.script_reply("HV1 ON", "ERR\r\n");
        handle.script_reply("CONFIRM", "DONE\r\n");

        let mut transport = SerialTransport::new(port, "mock");
        let post = [PostCommand::new("CONFIRM", "OK", "ERR")];
        let reply = transport.serial_comm("HV1 ON", &post).await.unwrap();

        // The refusal is surfaced and the confirmation is never sent.
        assert_eq!(reply, "ERR");
        assert_eq!(handle.writes_of("CONFIRM"), 0);
    }

    #[tokio::test]
    async fn test_ack_runs_the_dialogue() {
        let (port, handle) = MockSerialPort::new("mock");
        handle.script_reply("HV1 ON", "OK\r\n");
        handle.script_reply("CONFIRM", "CONFIRM DONE\r\n");

        let mut transport = SerialTransport::new(port, "mock");
        let post = [PostCommand::new("CONFIRM", "OK", "ERR")];
        let reply = transport.serial_comm("HV1 ON", &post).await.unwrap();
        assert_eq!(reply, "DONE");
        assert_eq!(handle.writes_of("CONFIRM"), 1);
    }

    #[tokio::test]
    async fn test_unknown_dialogue_reply_continues_and_is_counted() {
        let (port, handle) = MockSerialPort::new("mock");
        handle.script_reply("HV1 ON", "WAT\r\n");
        handle.script_reply("CONFIRM", "CONFIRM DONE\r\n");

        let accounting: SharedAccounting = Arc::new(Mutex::new(ErrorAccounting::new()));
        let mut transport = SerialTransport::new(port, "mock")
            .with_accounting(Arc::clone(&accounting));

        let post = [PostCommand::new("CONFIRM", "OK", "ERR")];
        let reply = transport.serial_comm("HV1 ON", &post).await.unwrap();

        // Unknown reply is not the NACK: logged, counted, dialogue goes on.
        assert_eq!(reply, "DONE");
        assert_eq!(handle.writes_of("CONFIRM"), 1);
        assert_eq!(accounting.lock().unwrap().total(), 1);
    }

    #[tokio::test]
    async fn test_black_box_records_exchanges() {
        let (port, handle) = MockSerialPort::new("mock");
        handle.script_reply("PZ", "PZ 1e-9\r\n");

        let bb = BlackBox::new(8);
        let mut transport = SerialTransport::new(port, "mock").with_black_box(bb.clone());
        transport.serial_comm("PZ", &[]).await.unwrap();
        handle.set_reachable(false);
        transport.serial_comm("PZ", &[]).await.ok();

        let records = bb.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, "1e-9");
        assert!(records[1].outcome.contains("not available"));
    }
}
