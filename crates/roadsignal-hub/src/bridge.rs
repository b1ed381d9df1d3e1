//! [`RelayBridge`] – the ingestion thread's only door into the broadcast
//! context.
//!
//! Single producer, single consumer: the bridge is deliberately not `Clone`,
//! and the receiving half lives inside [`HubService`][crate::HubService].
//! Submission is an unbounded, non-blocking enqueue, so a slow subscriber can
//! never stall the device read loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use roadsignal_types::StateEvent;
use tokio::sync::mpsc;
use tracing::trace;

/// What happened to a submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Enqueued for the broadcast context, behind every earlier submission.
    Queued,
    /// The broadcast context is not running; the event was discarded.
    Dropped,
}

/// Producer half of the ingestion → broadcast handoff.
///
/// Obtain one from [`relay`][crate::relay].
pub struct RelayBridge {
    events: mpsc::UnboundedSender<StateEvent>,
    running: Arc<AtomicBool>,
}

impl RelayBridge {
    pub(crate) fn new(events: mpsc::UnboundedSender<StateEvent>, running: Arc<AtomicBool>) -> Self {
        Self { events, running }
    }

    /// Hand `event` to the broadcast context without waiting for delivery.
    ///
    /// When the broadcast context has not started yet, or has already shut
    /// down, the event is dropped rather than queued.
    pub fn submit(&self, event: StateEvent) -> SubmitOutcome {
        if !self.running.load(Ordering::Acquire) {
            trace!(raw = %event.raw, "broadcast context not running; event dropped");
            return SubmitOutcome::Dropped;
        }
        match self.events.send(event) {
            Ok(()) => SubmitOutcome::Queued,
            Err(_) => SubmitOutcome::Dropped,
        }
    }

    /// `true` while the broadcast context is accepting events.
    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.events.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadsignal_hal::translate;

    fn bridge(running: bool) -> (RelayBridge, mpsc::UnboundedReceiver<StateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RelayBridge::new(tx, Arc::new(AtomicBool::new(running))), rx)
    }

    #[test]
    fn submit_is_noop_when_not_running() {
        let (bridge, mut rx) = bridge(false);
        assert!(!bridge.is_open());
        assert_eq!(bridge.submit(translate("road X").unwrap()), SubmitOutcome::Dropped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn submissions_arrive_in_order() {
        let (bridge, mut rx) = bridge(true);
        assert!(bridge.is_open());

        for line in ["road X", "road Y", "banana", "road X"] {
            assert_eq!(bridge.submit(translate(line).unwrap()), SubmitOutcome::Queued);
        }

        let received: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.raw)
            .collect();
        assert_eq!(received, ["road X", "road Y", "banana", "road X"]);
    }

    #[test]
    fn submit_after_consumer_dropped_is_dropped() {
        let (bridge, rx) = bridge(true);
        drop(rx);
        assert!(!bridge.is_open());
        assert_eq!(bridge.submit(translate("road Y").unwrap()), SubmitOutcome::Dropped);
    }

    #[test]
    fn submit_from_foreign_thread() {
        let (bridge, mut rx) = bridge(true);
        let producer = std::thread::spawn(move || {
            for line in ["road X", "road Y"] {
                bridge.submit(translate(line).unwrap());
            }
        });
        producer.join().unwrap();

        assert_eq!(rx.try_recv().unwrap().raw, "road X");
        assert_eq!(rx.try_recv().unwrap().raw, "road Y");
    }
}
