//! `roadsignal-display` – local terminal view of the relayed signal state.
//!
//! The panel lives on its own thread. [`DisplayHandle`] is the only way in:
//! it implements [`UiProjector`] by posting events to that thread, so the
//! broadcast context never touches panel state directly.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roadsignal_display::TerminalDisplay;
//! use roadsignal_hub::{BroadcastHub, HubConfig};
//!
//! let (display, _ui_thread) = TerminalDisplay::spawn().unwrap();
//! let hub = BroadcastHub::new(HubConfig::default()).with_projector(Arc::new(display));
//! ```

pub mod panel;

use std::io::{self, Write};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use roadsignal_hub::UiProjector;
use roadsignal_types::StateEvent;
use tracing::{debug, warn};

pub use panel::{LightPanel, WAITING_STATUS};

/// Name of the UI thread.
pub const DISPLAY_THREAD_NAME: &str = "roadsignal-display";

/// Posts events to the display thread. The thread exits once every handle
/// is dropped.
#[derive(Clone)]
pub struct DisplayHandle {
    tx: mpsc::Sender<StateEvent>,
}

impl UiProjector for DisplayHandle {
    fn schedule_update(&self, event: StateEvent) {
        if self.tx.send(event).is_err() {
            debug!("display thread gone; update discarded");
        }
    }
}

pub struct TerminalDisplay;

impl TerminalDisplay {
    /// Draw the panel on stdout.
    pub fn spawn() -> io::Result<(DisplayHandle, JoinHandle<LightPanel>)> {
        Self::spawn_with_writer(io::stdout())
    }

    /// Draw the panel into `out`, one line per update. The thread returns
    /// the final panel state when it exits.
    pub fn spawn_with_writer<W>(mut out: W) -> io::Result<(DisplayHandle, JoinHandle<LightPanel>)>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<StateEvent>();
        let thread = thread::Builder::new()
            .name(DISPLAY_THREAD_NAME.to_string())
            .spawn(move || {
                let mut panel = LightPanel::new();
                draw(&mut out, &panel);
                for event in rx {
                    panel.apply(&event);
                    draw(&mut out, &panel);
                }
                panel
            })?;
        Ok((DisplayHandle { tx }, thread))
    }
}

fn draw(out: &mut impl Write, panel: &LightPanel) {
    if let Err(e) = writeln!(out, "{}", panel.render()).and_then(|()| out.flush()) {
        warn!(error = %e, "display write failed");
    }
}
