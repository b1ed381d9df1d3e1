//! Boundary to a UI that renders the same event stream.

use roadsignal_types::StateEvent;

/// A display that must be updated on its own UI thread.
///
/// The hub calls [`schedule_update`](UiProjector::schedule_update) from the
/// broadcast context for every event, including when no subscriber is
/// connected. Implementations marshal the event onto their UI thread and
/// return immediately; they must never touch UI state from the caller's
/// thread.
pub trait UiProjector: Send + Sync {
    fn schedule_update(&self, event: StateEvent);
}
