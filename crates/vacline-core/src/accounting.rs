//! Error accounting shared by the serial and event engines.
//!
//! Two views of the same failures: consecutive per-attribute counters that
//! drive the hysteresis in the state machines, and a global rate accumulated
//! over a fixed window for operator reports.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::caseless::CaselessMap;
use crate::constants::ERROR_RATE_WINDOW;

/// Per-attribute and global error counters.
#[derive(Debug, Clone)]
pub struct ErrorAccounting {
    counters: CaselessMap<u32>,
    total: u64,
    rate: u32,
    rate_epoch: DateTime<Utc>,
    last_error: Option<(String, DateTime<Utc>)>,
}

impl Default for ErrorAccounting {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorAccounting {
    pub fn new() -> Self {
        Self {
            counters: CaselessMap::new(),
            total: 0,
            rate: 0,
            rate_epoch: Utc::now(),
            last_error: None,
        }
    }

    /// Record an error against an attribute; returns its new consecutive count.
    pub fn record_for(&mut self, attribute: &str, description: impl Into<String>) -> u32 {
        self.record_at(Utc::now(), attribute, description)
    }

    /// Record an error not tied to a particular attribute.
    pub fn record(&mut self, description: impl Into<String>) {
        self.record_at(Utc::now(), "", description);
    }

    fn record_at(
        &mut self,
        now: DateTime<Utc>,
        attribute: &str,
        description: impl Into<String>,
    ) -> u32 {
        let window = ChronoDuration::from_std(ERROR_RATE_WINDOW).unwrap_or(ChronoDuration::hours(1));
        if now - self.rate_epoch >= window {
            self.rate = 0;
            self.rate_epoch = now;
        }
        self.rate += 1;
        self.total += 1;
        self.last_error = Some((description.into(), now));

        if attribute.is_empty() {
            return 0;
        }
        let count = self.counters.get(attribute).copied().unwrap_or(0) + 1;
        self.counters.insert(attribute, count);
        count
    }

    /// Consecutive error count for an attribute.
    pub fn count_for(&self, attribute: &str) -> u32 {
        self.counters.get(attribute).copied().unwrap_or(0)
    }

    /// Clear the consecutive counter for an attribute after a good reading.
    pub fn reset_for(&mut self, attribute: &str) {
        self.counters.remove(attribute);
    }

    /// Total errors recorded since construction.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Errors recorded in the current rate window.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Most recent error, if any.
    pub fn last_error(&self) -> Option<(&str, DateTime<Utc>)> {
        self.last_error.as_ref().map(|(d, t)| (d.as_str(), *t))
    }

    /// Human-readable summary of the error counters.
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "{} errors in total, {} since {}",
            self.total,
            self.rate,
            self.rate_epoch.format("%Y-%m-%d %H:%M:%S")
        ));
        if let Some((description, at)) = &self.last_error {
            lines.push(format!(
                "last error at {}: {}",
                at.format("%Y-%m-%d %H:%M:%S"),
                description
            ));
        }
        for (attribute, count) in self.counters.iter() {
            lines.push(format!("{}: {} consecutive errors", attribute, count));
        }
        lines.join("\n")
    }
}
