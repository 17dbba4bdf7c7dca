//! Real TTY driver behind the `hardware-serial` feature.
//!
//! Wraps the blocking `serialport` crate; blocking reads and writes run on
//! the Tokio blocking pool, with the port handle moved in and out of the
//! closure so the driver itself stays `Send`.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use vacline_core::{CoreError, Result};

use crate::port::SerialPort;

/// Serial port on a real TTY device node.
pub struct TtyPort {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl TtyPort {
    /// Create a driver for the given device node; the port is opened lazily.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
        }
    }

    /// Device node path.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn take_port(&mut self) -> Result<Box<dyn serialport::SerialPort>> {
        self.port
            .take()
            .ok_or_else(|| CoreError::other(format!("{} is not open", self.path)))
    }
}

fn map_err(e: serialport::Error) -> CoreError {
    CoreError::other(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> CoreError {
    CoreError::other(format!("blocking serial task failed: {}", e))
}

impl SerialPort for TtyPort {
    async fn probe(&mut self) -> Result<bool> {
        Ok(self.port.is_some() || Path::new(&self.path).exists())
    }

    async fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let path = self.path.clone();
        let baud_rate = self.baud_rate;
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(&path, baud_rate)
                .timeout(Duration::from_millis(50))
                .open()
        })
        .await
        .map_err(join_err)?
        .map_err(map_err)?;
        debug!(path = %self.path, baud_rate, "tty opened");
        self.port = Some(port);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the handle releases the device node.
        self.port = None;
        Ok(())
    }

    async fn flush_input(&mut self) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            port.clear(serialport::ClearBuffer::Input).map_err(map_err)?;
        }
        Ok(())
    }

    async fn flush_output(&mut self) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            port.clear(serialport::ClearBuffer::Output).map_err(map_err)?;
        }
        Ok(())
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let mut port = self.take_port()?;
        let data = data.to_vec();
        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = std::io::Write::write_all(&mut port, &data)
                .and_then(|()| std::io::Write::flush(&mut port));
            (port, result)
        })
        .await
        .map_err(join_err)?;
        self.port = Some(port);
        result.map_err(CoreError::from)
    }

    async fn read_raw(&mut self, window: Duration) -> Result<Bytes> {
        let mut port = self.take_port()?;
        let (port, result) = tokio::task::spawn_blocking(move || {
            if let Err(e) = port.set_timeout(window) {
                return (port, Err(map_err(e)));
            }
            let mut buffer = [0u8; 256];
            let result = match std::io::Read::read(&mut port, &mut buffer) {
                Ok(n) => Ok(Bytes::copy_from_slice(&buffer[..n])),
                // A timed-out read is the quiescence marker, not a failure.
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Bytes::new()),
                Err(e) => Err(CoreError::from(e)),
            };
            (port, result)
        })
        .await
        .map_err(join_err)?;
        self.port = Some(port);
        result
    }
}
