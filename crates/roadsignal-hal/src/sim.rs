//! Simulated controller for running the full relay without hardware.
//!
//! [`MockDevice`] cycles through a fixed list of lines, emitting the first
//! one immediately and the next after every `interval`. It honours the read
//! window like a real port would: a call never sleeps longer than `timeout`.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use roadsignal_hal::{EventSource, LineRead, MockDevice};
//!
//! let mut dev = MockDevice::new(Duration::from_secs(5));
//! let first = dev.read_line(Duration::from_millis(10)).unwrap();
//! assert_eq!(first, LineRead::Line("road X".to_string()));
//! ```

use std::thread;
use std::time::{Duration, Instant};

use roadsignal_types::RelayError;
use tracing::debug;

use crate::source::{EventSource, LineRead};

/// Default emission period, matching the bench controller.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

pub struct MockDevice {
    messages: Vec<String>,
    next: usize,
    interval: Duration,
    next_due: Instant,
}

impl MockDevice {
    /// Alternate `road X` / `road Y` every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self::with_messages(interval, ["road X", "road Y"])
    }

    /// Cycle through `messages` instead of the default pair.
    pub fn with_messages<I, S>(interval: Duration, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            messages: messages.into_iter().map(Into::into).collect(),
            next: 0,
            interval,
            next_due: Instant::now(),
        }
    }

    fn emit(&mut self) -> LineRead {
        let line = self.messages[self.next].clone();
        self.next = (self.next + 1) % self.messages.len();
        self.next_due = Instant::now() + self.interval;
        debug!(line = %line, "mock controller emitted");
        LineRead::Line(line)
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl EventSource for MockDevice {
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, RelayError> {
        if self.messages.is_empty() {
            thread::sleep(timeout);
            return Ok(LineRead::Timeout);
        }

        let wait = self.next_due.saturating_duration_since(Instant::now());
        if wait > timeout {
            thread::sleep(timeout);
            return Ok(LineRead::Timeout);
        }
        if !wait.is_zero() {
            thread::sleep(wait);
        }
        Ok(self.emit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_is_immediate_and_messages_alternate() {
        let mut dev = MockDevice::new(Duration::from_millis(5));
        let window = Duration::from_millis(200);

        let lines: Vec<LineRead> = (0..4).map(|_| dev.read_line(window).unwrap()).collect();
        assert_eq!(
            lines,
            vec![
                LineRead::Line("road X".into()),
                LineRead::Line("road Y".into()),
                LineRead::Line("road X".into()),
                LineRead::Line("road Y".into()),
            ]
        );
    }

    #[test]
    fn read_window_shorter_than_interval_times_out() {
        let mut dev = MockDevice::new(Duration::from_secs(60));
        let window = Duration::from_millis(5);

        assert!(matches!(dev.read_line(window).unwrap(), LineRead::Line(_)));
        let started = Instant::now();
        assert_eq!(dev.read_line(window).unwrap(), LineRead::Timeout);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn custom_messages_cycle() {
        let mut dev = MockDevice::with_messages(Duration::ZERO, ["1,10,30", "2,10,30"]);
        let window = Duration::from_millis(5);
        assert_eq!(dev.read_line(window).unwrap(), LineRead::Line("1,10,30".into()));
        assert_eq!(dev.read_line(window).unwrap(), LineRead::Line("2,10,30".into()));
        assert_eq!(dev.read_line(window).unwrap(), LineRead::Line("1,10,30".into()));
    }

    #[test]
    fn empty_script_only_times_out() {
        let mut dev = MockDevice::with_messages(Duration::ZERO, Vec::<String>::new());
        assert_eq!(dev.read_line(Duration::from_millis(1)).unwrap(), LineRead::Timeout);
    }
}
