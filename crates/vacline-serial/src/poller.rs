//! Polling engine: keeps the command table fresh over the serial line.
//!
//! The engine owns the transport and loops over the read commands, draining
//! pending writes before every read so operator commands never wait behind
//! the read list. The cycle period is spread evenly over the reads, with a
//! floor so a long read list cannot degenerate into busy-waiting.
//!
//! Failure handling per read: up to `retries` extra attempts with a
//! half-pause backoff, every failure recorded against the command in the
//! shared accounting, the consecutive counter reset on the first success.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vacline_core::constants::{DEFAULT_CYCLE, DEFAULT_RETRIES, MIN_PAUSE};
use vacline_core::ErrorAccounting;

use crate::commands::CommandTable;
use crate::port::SerialPort;
use crate::transport::{
    lock_comms, CommsStatus, PostCommand, SerialTransport, SharedAccounting, SharedComms,
};

/// Tuning knobs for the polling engine.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Target duration of one full pass over the read list.
    pub cycle_period: Duration,

    /// Extra attempts after a failed read (so `retries = 3` means up to
    /// four attempts in total).
    pub retries: u32,

    /// Confirmation dialogue appended to every exchange.
    pub post_commands: Vec<PostCommand>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            cycle_period: DEFAULT_CYCLE,
            retries: DEFAULT_RETRIES,
            post_commands: Vec::new(),
        }
    }
}

fn lock_table(table: &Arc<Mutex<CommandTable>>) -> MutexGuard<'_, CommandTable> {
    match table.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_accounting(accounting: &SharedAccounting) -> MutexGuard<'_, ErrorAccounting> {
    match accounting.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Cancellable sleep.
async fn idle(token: &CancellationToken, duration: Duration) {
    tokio::select! {
        _ = token.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

/// Serial polling engine.
///
/// Built around a transport and a shared [`CommandTable`]; clients read
/// published results through the table (or the [`PollerHandle`] once the
/// engine is started) and never touch the serial line directly.
pub struct PollingEngine<P: SerialPort> {
    transport: SerialTransport<P>,
    table: Arc<Mutex<CommandTable>>,
    accounting: SharedAccounting,
    config: PollerConfig,
}

impl<P: SerialPort + 'static> PollingEngine<P> {
    /// Create an engine with a fresh command table and error accounting.
    pub fn new(transport: SerialTransport<P>, config: PollerConfig) -> Self {
        let accounting: SharedAccounting = Arc::new(Mutex::new(ErrorAccounting::new()));
        Self {
            transport: transport.with_accounting(Arc::clone(&accounting)),
            table: Arc::new(Mutex::new(CommandTable::new())),
            accounting,
            config,
        }
    }

    /// Register a read command; `None` means read every cycle.
    pub fn add_read(&self, command: impl Into<String>, period: Option<Duration>) {
        lock_table(&self.table).add_read(command, period);
    }

    /// Queue a write command for the next cycle.
    ///
    /// The command is its own key: queueing it again before it went out
    /// replaces the pending copy instead of stacking a second one.
    pub fn push_write(&self, command: impl Into<String>) {
        let command = command.into();
        lock_table(&self.table).push_write(command.clone(), command);
    }

    /// Enable, retune or disable polling for a command; a zero or absent
    /// period removes it from the table.
    pub fn set_polled(&self, command: &str, period: Option<Duration>) -> bool {
        lock_table(&self.table).set_polled(command, period)
    }

    /// Shared command table.
    pub fn table(&self) -> Arc<Mutex<CommandTable>> {
        Arc::clone(&self.table)
    }

    /// Shared error accounting.
    pub fn accounting(&self) -> SharedAccounting {
        Arc::clone(&self.accounting)
    }

    /// Pause between two reads: the cycle period spread over the read list,
    /// floored so it never degenerates into busy-waiting.
    pub fn cycle_pause(&self) -> Duration {
        let reads = lock_table(&self.table).len().max(1) as u32;
        (self.config.cycle_period / reads).max(MIN_PAUSE)
    }

    /// Run one full pass over the read list.
    ///
    /// Public so a single deterministic cycle can be driven directly;
    /// [`start`](Self::start) wraps it in a cancellable loop. The token is
    /// checked between every sub-step and no lock is held across an await.
    pub async fn poll_cycle(&mut self, token: &CancellationToken) {
        let keys = lock_table(&self.table).read_keys();
        let pause = self.cycle_pause();

        // Writes go out even when nothing is registered for reading.
        self.drain_writes(token).await;

        for key in keys {
            if token.is_cancelled() {
                return;
            }

            // Operator writes queued mid-cycle go out before the next read.
            self.drain_writes(token).await;

            let now = Instant::now();
            if !lock_table(&self.table).is_due(&key, now) {
                idle(token, pause / 4).await;
                continue;
            }
            lock_table(&self.table).mark_polled(&key, now);

            let mut reply = None;
            for attempt in 0..=self.config.retries {
                if token.is_cancelled() {
                    return;
                }
                match self
                    .transport
                    .serial_comm(&key, &self.config.post_commands)
                    .await
                {
                    Ok(r) => {
                        reply = Some(r);
                        break;
                    }
                    Err(e) => {
                        debug!(command = %key, attempt, error = %e, "read failed");
                        lock_accounting(&self.accounting)
                            .record_for(&key, format!("SerialReadException: {}", e));
                        idle(token, pause / 2).await;
                    }
                }
            }

            if let Some(reply) = reply {
                lock_accounting(&self.accounting).reset_for(&key);
                lock_table(&self.table).publish(&key, reply);
            }

            idle(token, pause).await;
        }
    }

    /// Send every pending write, one attempt each, removed regardless.
    async fn drain_writes(&mut self, token: &CancellationToken) {
        let writes = lock_table(&self.table).take_writes();
        for write in writes {
            if token.is_cancelled() {
                return;
            }
            match self
                .transport
                .serial_comm(&write, &self.config.post_commands)
                .await
            {
                Ok(reply) => debug!(command = %write, reply = %reply, "write sent"),
                Err(e) => {
                    warn!(command = %write, error = %e, "write failed");
                    lock_accounting(&self.accounting).record(format!("{}: {}", write, e));
                }
            }
        }
    }

    /// Start the polling loop on a background task.
    pub fn start(mut self) -> PollerHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let table = Arc::clone(&self.table);
        let accounting = Arc::clone(&self.accounting);
        let comms = self.transport.comms();
        let stop_grace = self.transport.wait_time() + self.config.cycle_period;

        let join = tokio::spawn(async move {
            info!(
                line = %self.transport.name(),
                reads = lock_table(&self.table).len(),
                "polling engine started"
            );
            while !child.is_cancelled() {
                self.poll_cycle(&child).await;
                let end_pause = self.cycle_pause() / 3;
                idle(&child, end_pause).await;
            }
            info!(line = %self.transport.name(), "polling engine stopped");
        });

        PollerHandle {
            table,
            accounting,
            comms,
            token,
            join,
            stop_grace,
        }
    }
}

/// Handle to a running polling engine.
///
/// Reads only ever touch the published results; the serial line stays the
/// engine's private business.
pub struct PollerHandle {
    table: Arc<Mutex<CommandTable>>,
    accounting: SharedAccounting,
    comms: SharedComms,
    token: CancellationToken,
    join: JoinHandle<()>,
    stop_grace: Duration,
}

impl PollerHandle {
    /// Last published result for a read command.
    pub fn result_of(&self, command: &str) -> Option<String> {
        lock_table(&self.table).result_of(command)
    }

    /// Queue a write command, replacing any pending copy of it.
    pub fn push_write(&self, command: impl Into<String>) {
        let command = command.into();
        lock_table(&self.table).push_write(command.clone(), command);
    }

    /// Register a read command on the running engine.
    pub fn add_read(&self, command: impl Into<String>, period: Option<Duration>) {
        lock_table(&self.table).add_read(command, period);
    }

    /// Enable, retune or disable polling for a command; a zero or absent
    /// period removes it from the table.
    pub fn set_polled(&self, command: &str, period: Option<Duration>) -> bool {
        lock_table(&self.table).set_polled(command, period)
    }

    /// Shared command table.
    pub fn table(&self) -> Arc<Mutex<CommandTable>> {
        Arc::clone(&self.table)
    }

    /// Shared error accounting.
    pub fn accounting(&self) -> SharedAccounting {
        Arc::clone(&self.accounting)
    }

    /// Snapshot of the latest exchange bookkeeping.
    pub fn comms(&self) -> CommsStatus {
        lock_comms(&self.comms).clone()
    }

    /// Human-readable report: the comms line, then the error block.
    pub fn report(&self) -> String {
        format!(
            "{}\n{}",
            lock_comms(&self.comms).summary(),
            lock_accounting(&self.accounting).report()
        )
    }

    /// Stop the engine and wait for the loop to wind down.
    ///
    /// An engine stuck past the grace period is abandoned, not joined; the
    /// condition is logged and the task dies with the runtime.
    pub async fn stop(self) {
        self.token.cancel();
        match tokio::time::timeout(self.stop_grace, self.join).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "polling task panicked"),
            Err(_) => warn!("polling task did not stop within the grace period"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSerialPort;

    fn quick_config() -> PollerConfig {
        PollerConfig {
            cycle_period: Duration::from_millis(4),
            retries: 1,
            post_commands: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_cycle_pause_has_a_floor() {
        let (port, _handle) = MockSerialPort::new("mock");
        let transport =
            SerialTransport::new(port, "mock").with_wait_time(Duration::from_millis(8));
        let engine = PollingEngine::new(transport, quick_config());
        for i in 0..100 {
            engine.add_read(format!("C{}", i), None);
        }
        assert_eq!(engine.cycle_pause(), MIN_PAUSE);
    }

    #[tokio::test]
    async fn test_successful_read_resets_consecutive_counter() {
        let (port, handle) = MockSerialPort::new("mock");
        let transport =
            SerialTransport::new(port, "mock").with_wait_time(Duration::from_millis(8));
        let mut engine = PollingEngine::new(transport, quick_config());
        engine.add_read("PZ", None);

        let token = CancellationToken::new();

        // First cycle fails (no scripted reply).
        engine.poll_cycle(&token).await;
        assert!(lock_accounting(&engine.accounting).count_for("PZ") > 0);

        // Script a reply; the next cycle succeeds and clears the counter.
        handle.script_reply("PZ", "PZ 1e-9\r\n");
        engine.poll_cycle(&token).await;
        assert_eq!(lock_accounting(&engine.accounting).count_for("PZ"), 0);
        assert_eq!(engine.table().lock().unwrap().result_of("PZ").unwrap(), "1e-9");
    }
}
