//! Shared value types for the roadsignal relay.
//!
//! A [`StateEvent`] is produced once per controller line, relayed across the
//! ingestion/broadcast boundary, and projected into a [`StatePayload`] for
//! the wire.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which road currently holds the green light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    #[serde(rename = "road_x")]
    RoadXActive,
    #[serde(rename = "road_y")]
    RoadYActive,
    /// Anything the controller sent that is not a recognised road command.
    /// Observers render it as a neutral (all gray) state.
    Unknown,
}

impl SignalKind {
    /// Light colours as `(road X, road Y)`.
    pub fn lights(self) -> (LightColor, LightColor) {
        match self {
            SignalKind::RoadXActive => (LightColor::Green, LightColor::Red),
            SignalKind::RoadYActive => (LightColor::Red, LightColor::Green),
            SignalKind::Unknown => (LightColor::Gray, LightColor::Gray),
        }
    }
}

/// Colour of a single traffic light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColor {
    Green,
    Red,
    Gray,
}

impl fmt::Display for LightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightColor::Green => write!(f, "green"),
            LightColor::Red => write!(f, "red"),
            LightColor::Gray => write!(f, "gray"),
        }
    }
}

/// Controller telemetry triple, sent as `current_light,light_timer_seconds,fast_speed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReading {
    pub current_light: u32,
    pub light_timer_seconds: u32,
    pub fast_speed: u32,
}

/// One observed device status change. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEvent {
    pub kind: SignalKind,
    pub timestamp: DateTime<Utc>,
    /// The trimmed line as received from the device.
    pub raw: String,
    pub phase: Option<PhaseReading>,
}

/// Wire projection of a [`StateEvent`]: one self-contained JSON object per
/// event.
///
/// `light1State` is road X, `light2State` is road Y. Phase fields are
/// flattened into the object when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePayload {
    #[serde(rename = "light1State")]
    pub light1_state: LightColor,
    #[serde(rename = "light2State")]
    pub light2_state: LightColor,
    pub state: SignalKind,
    pub raw: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub phase: Option<PhaseReading>,
}

impl From<&StateEvent> for StatePayload {
    fn from(event: &StateEvent) -> Self {
        let (light1_state, light2_state) = event.kind.lights();
        Self {
            light1_state,
            light2_state,
            state: event.kind,
            raw: event.raw.clone(),
            timestamp: event.timestamp,
            phase: event.phase,
        }
    }
}

/// Serialized form of one event, shared read-only across every delivery
/// attempt for that event. Cloning only bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPayload(Arc<str>);

impl BroadcastPayload {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BroadcastPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error type shared by every roadsignal crate.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The upstream device could not be read (or the forward device written).
    #[error("Device transport error: {0}")]
    Transport(String),

    #[error("Event source closed")]
    SourceClosed,

    #[error("Send to subscriber {subscriber} failed: {details}")]
    SubscriberSend { subscriber: String, details: String },

    #[error("Send to subscriber {subscriber} timed out after {timeout_ms} ms")]
    SendTimeout { subscriber: String, timeout_ms: u64 },

    #[error("Payload serialization error: {0}")]
    Serialization(String),

    /// The broadcast context has shut down (or is shutting down).
    #[error("Broadcast hub is not running")]
    HubStopped,

    #[error("WebSocket server error: {0}")]
    Server(String),
}

impl RelayError {
    /// `true` for errors that end ingestion rather than a single delivery.
    pub fn is_fatal_to_ingestion(&self) -> bool {
        matches!(self, RelayError::Transport(_) | RelayError::SourceClosed)
    }
}
