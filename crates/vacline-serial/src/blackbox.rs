//! Black-box trace of recent serial exchanges.
//!
//! A capped ring of the last N exchanges (command, outcome, timestamp) kept
//! for post-mortem inspection. The transport records into it on every
//! exchange; operators dump it as TSV when a controller misbehaves.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use vacline_core::Result;

/// One recorded serial exchange.
#[derive(Debug, Clone)]
pub struct BlackBoxRecord {
    /// When the exchange finished.
    pub at: DateTime<Utc>,

    /// Command as sent (terminator stripped).
    pub command: String,

    /// Cleaned reply, or the error description on failure.
    pub outcome: String,
}

/// Shared ring buffer of recent exchanges.
///
/// Cloning shares the buffer; the transport and the operator surface hold
/// clones of the same ring.
#[derive(Debug, Clone)]
pub struct BlackBox {
    inner: Arc<Mutex<VecDeque<BlackBoxRecord>>>,
    capacity: usize,
}

impl BlackBox {
    /// Create a ring keeping the last `capacity` exchanges.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<BlackBoxRecord>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record an exchange, evicting the oldest entry when full.
    pub fn record(&self, command: impl Into<String>, outcome: impl Into<String>) {
        let mut ring = self.lock();
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(BlackBoxRecord {
            at: Utc::now(),
            command: command.into(),
            outcome: outcome.into(),
        });
    }

    /// Snapshot of the recorded exchanges, oldest first.
    pub fn records(&self) -> Vec<BlackBoxRecord> {
        self.lock().iter().cloned().collect()
    }

    /// Number of recorded exchanges.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Tab-separated dump: timestamp, command, outcome per line.
    pub fn to_tsv(&self) -> String {
        self.lock()
            .iter()
            .map(|r| {
                format!(
                    "{}\t{}\t{}",
                    r.at.format("%Y-%m-%d %H:%M:%S%.3f"),
                    r.command,
                    r.outcome
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write the TSV dump next to `prefix`, suffixed with a timestamp.
    ///
    /// Returns the path written, `<prefix>_YYYYmmdd_HHMMSS.tsv`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn save(&self, prefix: impl AsRef<Path>) -> Result<PathBuf> {
        let suffix = Utc::now().format("_%Y%m%d_%H%M%S");
        let mut path = prefix.as_ref().as_os_str().to_owned();
        path.push(format!("{}.tsv", suffix));
        let path = PathBuf::from(path);
        std::fs::write(&path, self.to_tsv())?;
        Ok(path)
    }
}
