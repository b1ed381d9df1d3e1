//! Raw controller line → [`StateEvent`].
//!
//! The controller speaks two dialects:
//!
//! | Line | Result |
//! |---|---|
//! | `road X` / `road Y` | [`SignalKind::RoadXActive`] / [`SignalKind::RoadYActive`] |
//! | `1,12,40` | [`SignalKind::Unknown`] carrying a [`PhaseReading`] |
//! | anything else | [`SignalKind::Unknown`] |
//!
//! Blank lines produce no event at all.

use chrono::{DateTime, Utc};
use roadsignal_types::{PhaseReading, SignalKind, StateEvent};

const ROAD_X: &str = "road X";
const ROAD_Y: &str = "road Y";

/// Translate `line`, stamping the event with the current time.
pub fn translate(line: &str) -> Option<StateEvent> {
    translate_at(line, Utc::now())
}

/// Translate `line` with an explicit timestamp.
///
/// Returns `None` only for empty or whitespace-only input.
pub fn translate_at(line: &str, timestamp: DateTime<Utc>) -> Option<StateEvent> {
    let raw = line.trim();
    if raw.is_empty() {
        return None;
    }

    let kind = match raw {
        ROAD_X => SignalKind::RoadXActive,
        ROAD_Y => SignalKind::RoadYActive,
        _ => SignalKind::Unknown,
    };

    Some(StateEvent {
        kind,
        timestamp,
        raw: raw.to_string(),
        phase: parse_phase(raw),
    })
}

fn parse_phase(raw: &str) -> Option<PhaseReading> {
    let mut fields = raw.split(',').map(|f| f.trim().parse::<u32>());
    let current_light = fields.next()?.ok()?;
    let light_timer_seconds = fields.next()?.ok()?;
    let fast_speed = fields.next()?.ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(PhaseReading {
        current_light,
        light_timer_seconds,
        fast_speed,
    })
}
