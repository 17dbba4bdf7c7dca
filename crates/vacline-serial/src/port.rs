//! Serial port trait definition.
//!
//! [`SerialPort`] is the seam between the transport and the physical line.
//! The mock implementation scripts conversations for tests; the real TTY
//! driver (behind the `hardware-serial` feature) forwards to the `serialport`
//! crate on a blocking thread.
//!
//! The trait methods are declared as RPITIT (Rust 1.90 + Edition 2024) with
//! an explicit `Send` bound so the polling engine can move the exchange
//! futures onto a spawned task; implementations still write plain
//! `async fn`. The trait is not object-safe, so dynamic dispatch goes
//! through the [`AnySerialPort`] enum wrapper.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use vacline_core::Result;

/// Byte-level access to a serial line.
///
/// The transport drives the port through a fixed exchange shape: probe,
/// open, flush, write the command, read reply chunks until quiescence,
/// close. Implementations only have to move bytes.
pub trait SerialPort: Send {
    /// Check that the line collaborator is alive.
    ///
    /// Called before every exchange. A `false` answer aborts the exchange
    /// with a transport-unavailable error; the next polling cycle retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the liveness check itself cannot be performed.
    fn probe(&mut self) -> impl Future<Output = Result<bool>> + Send;

    /// Open the line for one exchange.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the line after an exchange.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Discard any unread input.
    fn flush_input(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Discard any unsent output.
    fn flush_output(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Write raw bytes to the line.
    fn write_raw(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Read whatever is available, waiting at most `window`.
    ///
    /// An empty buffer is a valid answer and signals quiescence to the
    /// transport's sliced receive loop.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, not on empty input.
    fn read_raw(&mut self, window: Duration) -> impl Future<Output = Result<Bytes>> + Send;
}

/// Enum wrapper for dynamic dispatch over serial port implementations.
///
/// Zero-cost at the call site; each variant is monomorphized. Add a variant
/// here when a new port implementation appears.
pub enum AnySerialPort {
    /// Scripted mock port for tests and development.
    Mock(crate::mock::MockSerialPort),

    /// Real TTY via the `serialport` crate.
    #[cfg(feature = "hardware-serial")]
    Tty(crate::tty::TtyPort),
}

impl SerialPort for AnySerialPort {
    async fn probe(&mut self) -> Result<bool> {
        match self {
            Self::Mock(p) => p.probe().await,
            #[cfg(feature = "hardware-serial")]
            Self::Tty(p) => p.probe().await,
        }
    }

    async fn open(&mut self) -> Result<()> {
        match self {
            Self::Mock(p) => p.open().await,
            #[cfg(feature = "hardware-serial")]
            Self::Tty(p) => p.open().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Mock(p) => p.close().await,
            #[cfg(feature = "hardware-serial")]
            Self::Tty(p) => p.close().await,
        }
    }

    async fn flush_input(&mut self) -> Result<()> {
        match self {
            Self::Mock(p) => p.flush_input().await,
            #[cfg(feature = "hardware-serial")]
            Self::Tty(p) => p.flush_input().await,
        }
    }

    async fn flush_output(&mut self) -> Result<()> {
        match self {
            Self::Mock(p) => p.flush_output().await,
            #[cfg(feature = "hardware-serial")]
            Self::Tty(p) => p.flush_output().await,
        }
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Mock(p) => p.write_raw(data).await,
            #[cfg(feature = "hardware-serial")]
            Self::Tty(p) => p.write_raw(data).await,
        }
    }

    async fn read_raw(&mut self, window: Duration) -> Result<Bytes> {
        match self {
            Self::Mock(p) => p.read_raw(window).await,
            #[cfg(feature = "hardware-serial")]
            Self::Tty(p) => p.read_raw(window).await,
        }
    }
}
