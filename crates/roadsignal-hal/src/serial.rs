//! Serial port access.
//!
//! Ports are opened through `serialport` so the baud rate and the read/write
//! timeout are set on the line itself instead of being left to whatever the
//! tty was configured with.

use std::path::Path;
use std::time::Duration;

use roadsignal_types::RelayError;
use serialport::SerialPort;
use tracing::debug;

/// Line speed of the bench controllers.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Open `path` at `baud_rate` with every read and write bounded by `timeout`.
///
/// # Errors
///
/// [`RelayError::Transport`] if the port cannot be opened or configured.
pub fn open_port(
    path: impl AsRef<Path>,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, RelayError> {
    let name = path.as_ref().to_string_lossy().into_owned();
    let port = serialport::new(name.as_str(), baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| RelayError::Transport(format!("cannot open {name}: {e}")))?;
    debug!(
        port = %name,
        baud_rate,
        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        "serial port opened"
    );
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_port_is_a_transport_error() {
        let err = open_port("/definitely/not/a/port", DEFAULT_BAUD_RATE, Duration::from_millis(10))
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::Transport(ref msg) if msg.contains("/definitely/not/a/port")));
    }
}
