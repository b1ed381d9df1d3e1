//! Line-oriented event sources.
//!
//! The ingestion loop only ever talks to the [`EventSource`] trait, so the
//! physical device, an in-process feed, and the [`MockDevice`] are
//! interchangeable.
//!
//! [`MockDevice`]: crate::sim::MockDevice

use std::io::{self, BufRead, BufReader, ErrorKind, Read};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use roadsignal_types::RelayError;
use serialport::SerialPort;

use crate::serial::open_port;

/// Shortest read window handed to a device; a zero timeout means "block
/// forever" to most of them.
const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Outcome of a single bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, decoded and trimmed. May be empty.
    Line(String),
    /// Nothing arrived within the read window.
    Timeout,
}

/// A blocking, line-oriented producer of raw controller text.
pub trait EventSource: Send {
    /// Block for at most roughly `timeout` waiting for the next line.
    ///
    /// # Errors
    ///
    /// [`RelayError::SourceClosed`] once the source is exhausted and
    /// [`RelayError::Transport`] when the underlying device fails.
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, RelayError>;
}

impl<S: EventSource + ?Sized> EventSource for Box<S> {
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, RelayError> {
        (**self).read_line(timeout)
    }
}

// ---------------------------------------------------------------------------
// Device reader
// ---------------------------------------------------------------------------

/// A byte stream whose blocking reads can be bounded.
///
/// Once a window is set, a read that sees no data within it fails with
/// `TimedOut` or `WouldBlock`.
pub trait ReadWindow: Read {
    fn set_read_window(&mut self, window: Duration) -> io::Result<()>;
}

impl ReadWindow for Box<dyn SerialPort> {
    fn set_read_window(&mut self, window: Duration) -> io::Result<()> {
        (**self).set_timeout(window).map_err(io::Error::from)
    }
}

#[cfg(unix)]
impl ReadWindow for UnixStream {
    fn set_read_window(&mut self, window: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(window))
    }
}

/// In-memory bytes never block.
impl ReadWindow for &[u8] {
    fn set_read_window(&mut self, _window: Duration) -> io::Result<()> {
        Ok(())
    }
}

/// Buffered line reader over a serial port or any other [`ReadWindow`].
///
/// Each [`read_line`](EventSource::read_line) applies its timeout to the
/// underlying stream first, so an idle device yields [`LineRead::Timeout`]
/// instead of blocking. Bytes received before the timeout are kept and
/// prefixed to the next line.
pub struct DeviceSource<R> {
    name: String,
    reader: BufReader<R>,
    pending: Vec<u8>,
    window: Option<Duration>,
}

impl DeviceSource<Box<dyn SerialPort>> {
    /// Open the controller port (e.g. `/dev/ttyACM0`) at `baud_rate`.
    ///
    /// `read_timeout` is the initial read window; later reads use the
    /// timeout passed to `read_line`.
    pub fn open(
        path: impl AsRef<Path>,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let port = open_port(path, baud_rate, read_timeout.max(MIN_WINDOW))?;
        let mut source = Self::new(path.display().to_string(), port);
        source.window = Some(read_timeout.max(MIN_WINDOW));
        Ok(source)
    }
}

impl<R: Read> DeviceSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader: BufReader::new(reader),
            pending: Vec::new(),
            window: None,
        }
    }

    fn take_line(&mut self) -> LineRead {
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        LineRead::Line(line)
    }
}

impl<R: ReadWindow> DeviceSource<R> {
    fn apply_window(&mut self, timeout: Duration) -> Result<(), RelayError> {
        let window = timeout.max(MIN_WINDOW);
        if self.window == Some(window) {
            return Ok(());
        }
        self.reader
            .get_mut()
            .set_read_window(window)
            .map_err(|e| RelayError::Transport(format!("set read timeout on {}: {e}", self.name)))?;
        self.window = Some(window);
        Ok(())
    }
}

impl<R: ReadWindow + Send> EventSource for DeviceSource<R> {
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, RelayError> {
        self.apply_window(timeout)?;
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) if self.pending.is_empty() => Err(RelayError::SourceClosed),
            // Either a full line or the unterminated tail before EOF.
            Ok(_) => Ok(self.take_line()),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Ok(LineRead::Timeout)
            }
            Err(e) => Err(RelayError::Transport(format!("read from {}: {e}", self.name))),
        }
    }
}

// ---------------------------------------------------------------------------
// In-process channel
// ---------------------------------------------------------------------------

/// Source fed by a std [`mpsc`] channel, for embedding and tests.
///
/// Dropping every sender closes the source.
pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Create a connected sender/source pair.
    pub fn channel() -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }
}

impl EventSource for ChannelSource {
    fn read_line(&mut self, timeout: Duration) -> Result<LineRead, RelayError> {
        match self.rx.recv_timeout(timeout) {
            Ok(line) => Ok(LineRead::Line(line)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(LineRead::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(RelayError::SourceClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Reader that replays a fixed script of chunks and errors.
    struct Scripted {
        steps: VecDeque<Result<Vec<u8>, ErrorKind>>,
        windows: Vec<Duration>,
    }

    impl Scripted {
        fn new(steps: Vec<Result<&[u8], ErrorKind>>) -> Self {
            Self {
                steps: steps.into_iter().map(|s| s.map(<[u8]>::to_vec)).collect(),
                windows: Vec::new(),
            }
        }
    }

    impl ReadWindow for Scripted {
        fn set_read_window(&mut self, window: Duration) -> io::Result<()> {
            self.windows.push(window);
            Ok(())
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Err(kind)) => Err(io::Error::from(kind)),
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
            }
        }
    }

    const WINDOW: Duration = Duration::from_millis(10);

    #[test]
    fn reads_trimmed_lines_then_closes() {
        let mut src = DeviceSource::new("test", &b"road X\r\nroad Y\n"[..]);
        assert_eq!(src.read_line(WINDOW).unwrap(), LineRead::Line("road X".into()));
        assert_eq!(src.read_line(WINDOW).unwrap(), LineRead::Line("road Y".into()));
        assert!(matches!(src.read_line(WINDOW), Err(RelayError::SourceClosed)));
    }

    #[test]
    fn unterminated_tail_is_delivered_before_close() {
        let mut src = DeviceSource::new("test", &b"road X"[..]);
        assert_eq!(src.read_line(WINDOW).unwrap(), LineRead::Line("road X".into()));
        assert!(matches!(src.read_line(WINDOW), Err(RelayError::SourceClosed)));
    }

    #[test]
    fn partial_line_survives_timeout() {
        let script = Scripted::new(vec![
            Ok(&b"road"[..]),
            Err(ErrorKind::TimedOut),
            Ok(&b" X\n"[..]),
        ]);
        let mut src = DeviceSource::new("scripted", script);

        assert_eq!(src.read_line(WINDOW).unwrap(), LineRead::Timeout);
        assert_eq!(src.read_line(WINDOW).unwrap(), LineRead::Line("road X".into()));
    }

    #[test]
    fn would_block_is_a_timeout() {
        let script = Scripted::new(vec![Err(ErrorKind::WouldBlock), Ok(&b"road Y\n"[..])]);
        let mut src = DeviceSource::new("scripted", script);
        assert_eq!(src.read_line(WINDOW).unwrap(), LineRead::Timeout);
        assert_eq!(src.read_line(WINDOW).unwrap(), LineRead::Line("road Y".into()));
    }

    #[test]
    fn invalid_utf8_is_substituted() {
        let mut src = DeviceSource::new("test", &b"road \xffX\n"[..]);
        match src.read_line(WINDOW).unwrap() {
            LineRead::Line(line) => {
                assert!(line.starts_with("road "));
                assert!(line.ends_with('X'));
                assert!(line.contains('\u{FFFD}'));
            }
            other => panic!("expected a line, got {other:?}"),
        }
    }

    #[test]
    fn other_io_errors_are_transport_errors() {
        let script = Scripted::new(vec![Err(ErrorKind::BrokenPipe)]);
        let mut src = DeviceSource::new("scripted", script);
        let err = src.read_line(WINDOW).unwrap_err();
        assert!(matches!(err, RelayError::Transport(ref msg) if msg.contains("scripted")));
    }

    #[test]
    fn read_window_is_applied_once_per_change() {
        let script = Scripted::new(vec![
            Err(ErrorKind::TimedOut),
            Err(ErrorKind::TimedOut),
            Ok(&b"road X\n"[..]),
        ]);
        let mut src = DeviceSource::new("scripted", script);

        src.read_line(WINDOW).unwrap();
        src.read_line(WINDOW).unwrap();
        src.read_line(Duration::ZERO).unwrap();
        assert_eq!(src.reader.get_ref().windows, [WINDOW, MIN_WINDOW]);
    }

    #[cfg(unix)]
    #[test]
    fn idle_socket_times_out_within_the_window() {
        use std::io::Write;
        use std::time::Instant;

        let (mut peer, idle) = UnixStream::pair().unwrap();
        let mut src = DeviceSource::new("socket", idle);

        let started = Instant::now();
        assert_eq!(src.read_line(Duration::from_millis(50)).unwrap(), LineRead::Timeout);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(40), "returned early: {waited:?}");
        assert!(waited < Duration::from_secs(1), "read not bounded: {waited:?}");

        peer.write_all(b"road").unwrap();
        assert_eq!(src.read_line(Duration::from_millis(50)).unwrap(), LineRead::Timeout);
        peer.write_all(b" Y\n").unwrap();
        assert_eq!(
            src.read_line(Duration::from_millis(50)).unwrap(),
            LineRead::Line("road Y".into())
        );

        drop(peer);
        assert!(matches!(src.read_line(Duration::from_millis(50)), Err(RelayError::SourceClosed)));
    }

    #[test]
    fn open_missing_device_fails() {
        let err = DeviceSource::open("/definitely/not/a/device", 9600, WINDOW)
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::Transport(_)));
    }

    #[test]
    fn channel_source_times_out_and_closes() {
        let (tx, mut src) = ChannelSource::channel();
        assert_eq!(src.read_line(WINDOW).unwrap(), LineRead::Timeout);

        tx.send("road X".to_string()).unwrap();
        assert_eq!(src.read_line(WINDOW).unwrap(), LineRead::Line("road X".into()));

        drop(tx);
        assert!(matches!(src.read_line(WINDOW), Err(RelayError::SourceClosed)));
    }
}
