//! Serial-line access layer for vacuum controllers.
//!
//! This crate owns everything that touches the serial line: the
//! [`SerialPort`] trait and its mock/real implementations, the
//! request/response transport with its sliced receive and echo cleanup, the
//! command table shared between the polling engine and its clients, the
//! polling engine itself, and the black-box trace of recent exchanges.
//!
//! # Design
//!
//! - **Async-first**: all I/O operations are asynchronous; the [`SerialPort`]
//!   trait declares its methods as RPITIT with `Send` futures so the engine
//!   can run exchanges on a spawned task, while implementations write plain
//!   `async fn`.
//! - **Mock-friendly**: [`MockSerialPort`] scripts replies per command and
//!   records everything written, so the whole stack is testable without
//!   hardware; the real TTY driver lives behind the `hardware-serial`
//!   feature.
//! - **Enum dispatch**: `async fn` traits are not object-safe, so dynamic
//!   dispatch goes through the [`AnySerialPort`] enum wrapper.
//!
//! # Example
//!
//! ```no_run
//! use vacline_serial::{MockSerialPort, PollerConfig, PollingEngine, SerialTransport};
//!
//! # async fn example() -> vacline_core::Result<()> {
//! let (port, handle) = MockSerialPort::new("lab/serial/tty01");
//! handle.script_reply("PZ", "PZ 1.23E-08mbar\r\n");
//!
//! let transport = SerialTransport::new(port, "lab/serial/tty01");
//! let engine = PollingEngine::new(transport, PollerConfig::default());
//! engine.add_read("PZ", None);
//!
//! let poller = engine.start();
//! // ... read published results through the poller handle ...
//! poller.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod blackbox;
pub mod commands;
pub mod mock;
pub mod poller;
pub mod port;
pub mod transport;

#[cfg(feature = "hardware-serial")]
pub mod tty;

pub use blackbox::{BlackBox, BlackBoxRecord};
pub use commands::{CommandTable, Polling, ReadEntry};
pub use mock::{MockSerialHandle, MockSerialPort};
pub use poller::{PollerConfig, PollerHandle, PollingEngine};
pub use port::{AnySerialPort, SerialPort};
pub use transport::{CommsStatus, PostCommand, SerialTransport, SharedAccounting, SharedComms};

#[cfg(feature = "hardware-serial")]
pub use tty::TtyPort;
