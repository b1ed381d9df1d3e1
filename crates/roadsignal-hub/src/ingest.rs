//! Device ingestion loop.
//!
//! Runs on a dedicated OS thread because device reads block. Each iteration
//! waits at most `read_timeout` for a line so the stop flag is observed
//! promptly, then:
//!
//! 1. skips empty lines,
//! 2. forwards the line verbatim to the optional downstream device,
//! 3. translates it and submits the event through the [`RelayBridge`].
//!
//! A source error ends the loop and is returned to the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use roadsignal_hal::{EventSource, LineRead, LineSink, translate};
use roadsignal_types::RelayError;
use tracing::{error, info};

use crate::bridge::{RelayBridge, SubmitOutcome};

/// Name of the thread started by [`IngestLoop::spawn`].
pub const INGEST_THREAD_NAME: &str = "roadsignal-ingest";

/// Counters reported when the loop exits cleanly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Non-empty lines read from the device.
    pub lines: u64,
    /// Events handed to the broadcast context.
    pub submitted: u64,
    /// Events discarded because the broadcast context was not running.
    pub dropped: u64,
}

pub struct IngestLoop {
    source: Box<dyn EventSource>,
    bridge: RelayBridge,
    forwarder: Option<Box<dyn LineSink>>,
    read_timeout: Duration,
    stop: Arc<AtomicBool>,
}

impl IngestLoop {
    pub fn new(
        source: impl EventSource + 'static,
        bridge: RelayBridge,
        read_timeout: Duration,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source: Box::new(source),
            bridge,
            forwarder: None,
            read_timeout,
            stop,
        }
    }

    /// Copy every received line to `sink` before it is translated.
    pub fn with_forwarder(mut self, sink: impl LineSink + 'static) -> Self {
        self.forwarder = Some(Box::new(sink));
        self
    }

    /// Read until the stop flag is raised or the source fails.
    pub fn run(mut self) -> Result<IngestSummary, RelayError> {
        info!(
            read_timeout_ms = u64::try_from(self.read_timeout.as_millis()).unwrap_or(u64::MAX),
            forwarding = self.forwarder.is_some(),
            "ingestion started"
        );

        let mut summary = IngestSummary::default();
        while !self.stop.load(Ordering::SeqCst) {
            let line = match self.source.read_line(self.read_timeout) {
                Ok(LineRead::Line(line)) => line,
                Ok(LineRead::Timeout) => continue,
                Err(e) => {
                    error!(error = %e, "event source failed; ingestion stopping");
                    return Err(e);
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            summary.lines += 1;
            info!(line = %line, "device line received");

            if let Some(sink) = self.forwarder.as_mut() {
                if let Err(e) = sink.write_line(line) {
                    error!(error = %e, "forwarding failed; ingestion stopping");
                    return Err(e);
                }
            }

            let Some(event) = translate(line) else {
                continue;
            };
            match self.bridge.submit(event) {
                SubmitOutcome::Queued => summary.submitted += 1,
                SubmitOutcome::Dropped => summary.dropped += 1,
            }
        }

        info!(
            lines = summary.lines,
            submitted = summary.submitted,
            dropped = summary.dropped,
            "ingestion stopped"
        );
        Ok(summary)
    }

    /// Run on a new thread named [`INGEST_THREAD_NAME`].
    pub fn spawn(self) -> std::io::Result<JoinHandle<Result<IngestSummary, RelayError>>> {
        thread::Builder::new()
            .name(INGEST_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }
}
