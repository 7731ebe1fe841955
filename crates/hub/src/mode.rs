//! AUTOMATIC / MANUAL mode.
//!
//! Operator changes are applied locally at once and written to `/mode`
//! best-effort. A snapshot carrying a different mode overwrites the local one
//! without writing back.

use tokio::sync::watch;
use tracing::info;

use crate::channel::RemoteWrite;
use crate::dispatch::CommandDispatcher;
use crate::state::OperatingMode;

pub struct ModeController {
    mode: watch::Sender<OperatingMode>,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    pub fn new() -> Self {
        let (mode, _) = watch::channel(OperatingMode::default());
        Self { mode }
    }

    pub fn mode(&self) -> OperatingMode {
        *self.mode.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<OperatingMode> {
        self.mode.subscribe()
    }

    /// Returns `false` (and writes nothing) when `new` is already current.
    pub fn set_mode(&self, new: OperatingMode, dispatcher: &CommandDispatcher) -> bool {
        if self.mode() == new {
            return false;
        }
        self.mode.send_replace(new);
        dispatcher.dispatch(RemoteWrite::mode(new));
        info!(mode = %new, "mode set locally");
        true
    }

    pub fn toggle(&self, dispatcher: &CommandDispatcher) -> OperatingMode {
        let next = match self.mode() {
            OperatingMode::Automatic => OperatingMode::Manual,
            OperatingMode::Manual => OperatingMode::Automatic,
        };
        self.set_mode(next, dispatcher);
        next
    }

    pub fn is_manual_control_allowed(&self) -> bool {
        self.mode() == OperatingMode::Manual
    }

    /// Adopt the snapshot's `mode` field. Returns the new mode if it changed.
    pub fn apply_remote(&self, raw: Option<&str>) -> Option<OperatingMode> {
        let remote = raw.and_then(OperatingMode::from_remote)?;
        if remote == self.mode() {
            return None;
        }
        self.mode.send_replace(remote);
        Some(remote)
    }
}
