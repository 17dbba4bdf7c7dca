//! Mock serial port for development and testing.
//!
//! Follows the paired-handle pattern: [`MockSerialPort`] goes into the
//! transport, while the cloned [`MockSerialHandle`] stays with the test to
//! script replies and inspect what was written. Both share the same state.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use vacline_core::Result;

use crate::port::SerialPort;

/// Scripted behaviour for one command.
#[derive(Debug, Clone)]
enum ReplyScript {
    /// Same raw reply every time the command is written.
    Fixed(String),

    /// Raw reply delivered as separate read chunks, repeated every time.
    Chunked(Vec<String>),

    /// Replies consumed one per write; exhausted means silence.
    Queue(VecDeque<String>),
}

#[derive(Debug, Default)]
struct MockState {
    reachable: bool,
    open: bool,
    replies: HashMap<String, ReplyScript>,
    pending: VecDeque<Bytes>,
    sent: Vec<String>,
}

/// Mock serial port with scripted replies.
///
/// Writes are recorded with their line terminator stripped; the reply
/// scripted for the written command (if any) is queued for the following
/// reads, one chunk per read, then silence.
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle paired with a [`MockSerialPort`].
#[derive(Clone)]
pub struct MockSerialHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialPort {
    /// Create a reachable mock port and its scripting handle.
    pub fn new(name: impl Into<String>) -> (Self, MockSerialHandle) {
        let state = Arc::new(Mutex::new(MockState {
            reachable: true,
            ..MockState::default()
        }));
        (
            Self {
                name: name.into(),
                state: Arc::clone(&state),
            },
            MockSerialHandle { state },
        )
    }

    /// Name the port was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SerialPort for MockSerialPort {
    async fn probe(&mut self) -> Result<bool> {
        Ok(self.lock().reachable)
    }

    async fn open(&mut self) -> Result<()> {
        self.lock().open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().open = false;
        Ok(())
    }

    async fn flush_input(&mut self) -> Result<()> {
        self.lock().pending.clear();
        Ok(())
    }

    async fn flush_output(&mut self) -> Result<()> {
        Ok(())
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let written = String::from_utf8_lossy(data);
        let command = written.trim_end_matches(['\r', '\n']).to_string();

        let mut state = self.lock();
        state.sent.push(command.clone());

        let chunks: Vec<String> = match state.replies.get_mut(&command) {
            Some(ReplyScript::Fixed(reply)) => vec![reply.clone()],
            Some(ReplyScript::Chunked(parts)) => parts.clone(),
            Some(ReplyScript::Queue(queue)) => queue.pop_front().into_iter().collect(),
            None => Vec::new(),
        };
        for chunk in chunks {
            state.pending.push_back(Bytes::from(chunk));
        }
        Ok(())
    }

    async fn read_raw(&mut self, _window: Duration) -> Result<Bytes> {
        // No real waiting: scripted chunks come back immediately, and an
        // exhausted queue answers with the empty quiescence marker.
        tokio::task::yield_now().await;
        Ok(self.lock().pending.pop_front().unwrap_or_default())
    }
}

impl MockSerialHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Script a raw reply (echo and terminators included, if the emulated
    /// controller produces them) for every write of `command`.
    pub fn script_reply(&self, command: impl Into<String>, raw_reply: impl Into<String>) {
        self.lock()
            .replies
            .insert(command.into(), ReplyScript::Fixed(raw_reply.into()));
    }

    /// Script a reply delivered in several read chunks per write.
    pub fn script_chunks(&self, command: impl Into<String>, chunks: &[&str]) {
        self.lock().replies.insert(
            command.into(),
            ReplyScript::Chunked(chunks.iter().map(|c| c.to_string()).collect()),
        );
    }

    /// Queue a reply consumed by the next write of `command` only.
    ///
    /// Later writes of the same command fall back to silence once the queue
    /// is exhausted; useful for scripting a failure followed by recovery.
    pub fn push_reply(&self, command: impl Into<String>, raw_reply: impl Into<String>) {
        let mut state = self.lock();
        match state
            .replies
            .entry(command.into())
            .or_insert_with(|| ReplyScript::Queue(VecDeque::new()))
        {
            ReplyScript::Queue(queue) => queue.push_back(raw_reply.into()),
            script => *script = ReplyScript::Queue(VecDeque::from([raw_reply.into()])),
        }
    }

    /// Remove any script for `command`, leaving it silent.
    pub fn clear_reply(&self, command: impl AsRef<str>) {
        self.lock().replies.remove(command.as_ref());
    }

    /// Make the liveness probe succeed or fail.
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Everything written so far, terminators stripped, oldest first.
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// How many times `command` has been written.
    pub fn writes_of(&self, command: &str) -> usize {
        self.lock().sent.iter().filter(|s| s == &command).count()
    }

    /// Forget the write log.
    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_records_command_without_terminator() {
        let (mut port, handle) = MockSerialPort::new("mock");
        port.write_raw(b"PZ\r").await.unwrap();
        assert_eq!(handle.sent(), ["PZ"]);
        assert_eq!(handle.writes_of("PZ"), 1);
    }

    #[tokio::test]
    async fn test_scripted_reply_then_quiescence() {
        let (mut port, handle) = MockSerialPort::new("mock");
        handle.script_reply("PZ", "PZ 1.23E-08mbar\r\n");

        port.write_raw(b"PZ\r").await.unwrap();
        let chunk = port.read_raw(Duration::from_millis(10)).await.unwrap();
        assert_eq!(&chunk[..], b"PZ 1.23E-08mbar\r\n");

        let quiet = port.read_raw(Duration::from_millis(10)).await.unwrap();
        assert!(quiet.is_empty());
    }

    #[tokio::test]
    async fn test_chunked_reply_comes_in_pieces() {
        let (mut port, handle) = MockSerialPort::new("mock");
        handle.script_chunks("ST", &["ST ", "RUNNING\r\n"]);

        port.write_raw(b"ST\r").await.unwrap();
        assert_eq!(
            &port.read_raw(Duration::from_millis(10)).await.unwrap()[..],
            b"ST "
        );
        assert_eq!(
            &port.read_raw(Duration::from_millis(10)).await.unwrap()[..],
            b"RUNNING\r\n"
        );
    }

    #[tokio::test]
    async fn test_queued_replies_are_one_shot() {
        let (mut port, handle) = MockSerialPort::new("mock");
        handle.push_reply("PZ", "PZ 1e-9\r\n");

        port.write_raw(b"PZ\r").await.unwrap();
        assert!(!port.read_raw(Duration::from_millis(10)).await.unwrap().is_empty());

        // Queue exhausted: the same command now gets silence.
        port.write_raw(b"PZ\r").await.unwrap();
        assert!(port.read_raw(Duration::from_millis(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_probe() {
        let (mut port, handle) = MockSerialPort::new("mock");
        assert!(port.probe().await.unwrap());
        handle.set_reachable(false);
        assert!(!port.probe().await.unwrap());
    }
}
