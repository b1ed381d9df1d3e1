//! Four-light panel state and its one-line terminal rendering.

use colored::{ColoredString, Colorize};
use roadsignal_types::{LightColor, StateEvent};

/// Status line shown before the first event arrives.
pub const WAITING_STATUS: &str = "Waiting for data...";

/// Road X is drawn by lights `x1`/`x2`, road Y by `y1`/`y2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightPanel {
    x1: LightColor,
    x2: LightColor,
    y1: LightColor,
    y2: LightColor,
    status: String,
}

impl Default for LightPanel {
    fn default() -> Self {
        Self {
            x1: LightColor::Green,
            x2: LightColor::Green,
            y1: LightColor::Gray,
            y2: LightColor::Gray,
            status: WAITING_STATUS.to_string(),
        }
    }
}

impl LightPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set all four lights from `event` and show its raw line as status.
    pub fn apply(&mut self, event: &StateEvent) {
        let (x, y) = event.kind.lights();
        self.x1 = x;
        self.x2 = x;
        self.y1 = y;
        self.y2 = y;
        self.status = format!("Current: {}", event.raw);
    }

    pub fn road_x(&self) -> (LightColor, LightColor) {
        (self.x1, self.x2)
    }

    pub fn road_y(&self) -> (LightColor, LightColor) {
        (self.y1, self.y2)
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn render(&self) -> String {
        format!(
            "  X1 {}  X2 {}   Y1 {}  Y2 {}   {}",
            lamp(self.x1),
            lamp(self.x2),
            lamp(self.y1),
            lamp(self.y2),
            self.status.bold()
        )
    }
}

fn lamp(color: LightColor) -> ColoredString {
    match color {
        LightColor::Green => "●".green().bold(),
        LightColor::Red => "●".red().bold(),
        LightColor::Gray => "○".dimmed(),
    }
}
