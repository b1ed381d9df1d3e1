//! Downstream line forwarding.
//!
//! Every line received from the upstream controller can be copied verbatim
//! to a second device (the receiving controller on the bench rig).

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use roadsignal_types::RelayError;
use serialport::SerialPort;

use crate::serial::open_port;

/// A line-oriented output device.
pub trait LineSink: Send {
    /// Write `line` followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the device rejects the write.
    fn write_line(&mut self, line: &str) -> Result<(), RelayError>;
}

/// [`LineSink`] over any [`Write`], flushed after every line.
pub struct DeviceSink<W> {
    name: String,
    writer: W,
}

impl DeviceSink<Box<dyn SerialPort>> {
    /// Open the receiving port (e.g. `/dev/ttyUSB1`). A write that stalls
    /// longer than `write_timeout` fails.
    pub fn open(
        path: impl AsRef<Path>,
        baud_rate: u32,
        write_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let port = open_port(path, baud_rate, write_timeout)?;
        Ok(Self::new(path.display().to_string(), port))
    }
}

impl<W: Write> DeviceSink<W> {
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> LineSink for DeviceSink<W> {
    fn write_line(&mut self, line: &str) -> Result<(), RelayError> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush())
            .map_err(|e| RelayError::Transport(format!("write to {}: {e}", self.name)))
    }
}
