//! Command table shared between the polling engine and its clients.
//!
//! The table holds the list of read commands with their last published
//! results, plus the pending write commands. A key carries at most one
//! pending write at a time; pushing a second write for the same key
//! replaces the first, because only the latest setpoint matters on a
//! half-duplex line. Clients only ever look at the published results, so a
//! slow serial line never blocks a client.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use vacline_core::{CoreError, Result};

/// Periodic-polling bookkeeping for one read command.
#[derive(Debug, Clone)]
pub struct Polling {
    /// Minimum interval between two reads of the command.
    pub period: Duration,

    /// When the command was last attempted, if ever.
    pub last: Option<Instant>,
}

/// One read command and its last published result.
#[derive(Debug, Clone, Default)]
pub struct ReadEntry {
    /// Cleaned reply from the last successful exchange.
    pub last_result: Option<String>,

    /// Present when the command is read periodically rather than every cycle.
    pub polling: Option<Polling>,
}

/// Read commands, their results and the pending writes.
///
/// Commands are case-sensitive: they go to the controller verbatim.
#[derive(Debug, Default)]
pub struct CommandTable {
    reads: BTreeMap<String, ReadEntry>,
    writes: BTreeMap<String, String>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read command.
    ///
    /// With `period: None` the command is read on every cycle; with a period
    /// it is read at most once per period. Re-registering replaces the
    /// period but keeps the last published result.
    pub fn add_read(&mut self, command: impl Into<String>, period: Option<Duration>) {
        let entry = self.reads.entry(command.into()).or_default();
        entry.polling = period.map(|period| Polling { period, last: None });
    }

    /// Remove a read command, returning whether it was present.
    pub fn remove_read(&mut self, command: &str) -> bool {
        self.reads.remove(command).is_some()
    }

    /// Change the polling period of an existing read command.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCommand`] if the command is not registered.
    pub fn set_period(&mut self, command: &str, period: Option<Duration>) -> Result<()> {
        let entry = self
            .reads
            .get_mut(command)
            .ok_or_else(|| CoreError::UnknownCommand(command.to_string()))?;
        entry.polling = period.map(|period| Polling { period, last: None });
        Ok(())
    }

    /// Enable, retune or disable polling for a command.
    ///
    /// A zero or absent period disables the command entirely: it is removed
    /// from the table. Returns whether the command is still registered.
    pub fn set_polled(&mut self, command: &str, period: Option<Duration>) -> bool {
        match period {
            None => {
                self.remove_read(command);
                false
            }
            Some(period) if period.is_zero() => {
                self.remove_read(command);
                false
            }
            Some(period) => {
                self.add_read(command, Some(period));
                true
            }
        }
    }

    /// Queue a write under its key, replacing any write already pending
    /// there.
    pub fn push_write(&mut self, key: impl Into<String>, command: impl Into<String>) {
        self.writes.insert(key.into(), command.into());
    }

    /// Drain the pending writes in key order.
    pub fn take_writes(&mut self) -> Vec<String> {
        let drained = std::mem::take(&mut self.writes);
        drained.into_values().collect()
    }

    /// Number of keys with a pending write.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Registered read commands in sorted order.
    pub fn read_keys(&self) -> Vec<String> {
        self.reads.keys().cloned().collect()
    }

    /// Number of registered read commands.
    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    /// Whether the command should be read now.
    ///
    /// Non-periodic commands are always due; periodic ones only once their
    /// period has elapsed since the last attempt.
    pub fn is_due(&self, command: &str, now: Instant) -> bool {
        match self.reads.get(command).and_then(|e| e.polling.as_ref()) {
            None => true,
            Some(polling) => match polling.last {
                None => true,
                Some(last) => now.duration_since(last) >= polling.period,
            },
        }
    }

    /// Record that a read of the command was attempted.
    ///
    /// Marked before the attempt so a failing periodic command still waits
    /// out its period instead of hammering the line.
    pub fn mark_polled(&mut self, command: &str, now: Instant) {
        if let Some(polling) = self
            .reads
            .get_mut(command)
            .and_then(|e| e.polling.as_mut())
        {
            polling.last = Some(now);
        }
    }

    /// Publish the cleaned result of a successful read.
    pub fn publish(&mut self, command: &str, result: impl Into<String>) {
        if let Some(entry) = self.reads.get_mut(command) {
            entry.last_result = Some(result.into());
        }
    }

    /// Last published result for a read command.
    pub fn result_of(&self, command: &str) -> Option<String> {
        self.reads.get(command).and_then(|e| e.last_result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_periodic_is_always_due() {
        let mut table = CommandTable::new();
        table.add_read("PZ", None);
        let now = Instant::now();
        assert!(table.is_due("PZ", now));
        table.mark_polled("PZ", now);
        assert!(table.is_due("PZ", now));
    }

    #[test]
    fn test_periodic_waits_out_its_period() {
        let mut table = CommandTable::new();
        table.add_read("ID", Some(Duration::from_secs(60)));

        let now = Instant::now();
        assert!(table.is_due("ID", now));
        table.mark_polled("ID", now);
        assert!(!table.is_due("ID", now + Duration::from_secs(30)));
        assert!(table.is_due("ID", now + Duration::from_secs(60)));
    }

    #[test]
    fn test_publish_and_read_back() {
        let mut table = CommandTable::new();
        table.add_read("PZ", None);
        assert_eq!(table.result_of("PZ"), None);
        table.publish("PZ", "1.23E-08mbar");
        assert_eq!(table.result_of("PZ"), Some("1.23E-08mbar".to_string()));
    }

    #[test]
    fn test_reregister_keeps_last_result() {
        let mut table = CommandTable::new();
        table.add_read("PZ", None);
        table.publish("PZ", "1e-9");
        table.add_read("PZ", Some(Duration::from_secs(5)));
        assert_eq!(table.result_of("PZ"), Some("1e-9".to_string()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_one_pending_write_per_key() {
        let mut table = CommandTable::new();
        table.push_write("HV1", "HV1 ON");
        table.push_write("HV1", "HV1 OFF");
        table.push_write("HV2", "HV2 ON");
        assert_eq!(table.pending_writes(), 2);
        // Only the latest setpoint per key survives.
        assert_eq!(table.take_writes(), ["HV1 OFF", "HV2 ON"]);
        assert_eq!(table.pending_writes(), 0);
    }

    #[test]
    fn test_set_polled_none_or_zero_disables() {
        let mut table = CommandTable::new();
        table.add_read("ID", None);
        assert!(table.set_polled("ID", Some(Duration::from_secs(5))));
        assert_eq!(table.len(), 1);

        assert!(!table.set_polled("ID", None));
        assert!(table.is_empty());

        table.add_read("ID", None);
        assert!(!table.set_polled("ID", Some(Duration::ZERO)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_set_period_on_unknown_command_fails() {
        let mut table = CommandTable::new();
        assert!(table.set_period("nope", None).is_err());
    }
}
