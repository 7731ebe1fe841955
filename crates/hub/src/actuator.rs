//! Pump and cover state, reconciled from the command and legacy observed
//! fields of each snapshot.
//!
//! ## Read policy (per actuator, per snapshot)
//!
//! ```text
//! commandes.<x> present ──▶ Command(state)   published at once (optimistic)
//! else legacy field     ──▶ Observed(state)
//! else                  ──▶ Unchanged
//! ```
//!
//! A command is reported as applied before the device confirms it. If the
//! device never acts on it, the mirror keeps reporting the commanded state
//! for as long as the command field stays in the record; the legacy field is
//! not consulted while a command is present.

use tokio::sync::watch;
use tracing::debug;

use crate::snapshot::RemoteSnapshot;
use crate::state::{CoverState, PumpState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<T> {
    Command(T),
    Observed(T),
    Unchanged,
}

impl<T> Resolution<T> {
    fn resolve(
        command: Option<&str>,
        observed: Option<&str>,
        from_command: fn(&str) -> T,
        from_observed: fn(&str) -> T,
    ) -> Self {
        match (command, observed) {
            (Some(c), _) => Self::Command(from_command(c)),
            (None, Some(o)) => Self::Observed(from_observed(o)),
            (None, None) => Self::Unchanged,
        }
    }

    pub fn state(self) -> Option<T> {
        match self {
            Self::Command(s) | Self::Observed(s) => Some(s),
            Self::Unchanged => None,
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Observed(_) => "observed",
            Self::Unchanged => "unchanged",
        }
    }
}

pub fn resolve_pump(snapshot: &RemoteSnapshot) -> Resolution<PumpState> {
    Resolution::resolve(
        snapshot.pump_command(),
        snapshot.pump.as_deref(),
        PumpState::from_command,
        PumpState::from_observed,
    )
}

pub fn resolve_cover(snapshot: &RemoteSnapshot) -> Resolution<CoverState> {
    Resolution::resolve(
        snapshot.cover_command(),
        snapshot.cover.as_deref(),
        CoverState::from_command,
        CoverState::from_observed,
    )
}

/// States that actually changed while applying one snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorChanges {
    pub pump: Option<PumpState>,
    pub cover: Option<CoverState>,
}

pub struct ActuatorStateMirror {
    pump: watch::Sender<PumpState>,
    cover: watch::Sender<CoverState>,
}

impl Default for ActuatorStateMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorStateMirror {
    pub fn new() -> Self {
        let (pump, _) = watch::channel(PumpState::default());
        let (cover, _) = watch::channel(CoverState::default());
        Self { pump, cover }
    }

    pub fn apply(&self, snapshot: &RemoteSnapshot) -> ActuatorChanges {
        let pump = resolve_pump(snapshot);
        let cover = resolve_cover(snapshot);
        debug!(
            pump = pump.source(),
            cover = cover.source(),
            "actuator resolution"
        );

        ActuatorChanges {
            pump: pump.state().and_then(|s| publish(&self.pump, s)),
            cover: cover.state().and_then(|s| publish(&self.cover, s)),
        }
    }

    pub fn pump(&self) -> PumpState {
        *self.pump.borrow()
    }

    pub fn cover(&self) -> CoverState {
        *self.cover.borrow()
    }

    pub fn subscribe_pump(&self) -> watch::Receiver<PumpState> {
        self.pump.subscribe()
    }

    pub fn subscribe_cover(&self) -> watch::Receiver<CoverState> {
        self.cover.subscribe()
    }
}

/// Publish `next`; report it only if it differs from the current value.
fn publish<T: Copy + PartialEq>(tx: &watch::Sender<T>, next: T) -> Option<T> {
    tx.send_if_modified(|cur| {
        if *cur == next {
            false
        } else {
            *cur = next;
            true
        }
    })
    .then_some(next)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(v: serde_json::Value) -> RemoteSnapshot {
        RemoteSnapshot::from_value(v).unwrap()
    }

    // -- Resolution ---------------------------------------------------------

    #[test]
    fn command_takes_precedence_over_observed() {
        let s = snap(json!({"pompe": "OFF", "commandes": {"pompe": "ON"}}));
        assert_eq!(resolve_pump(&s), Resolution::Command(PumpState::On));
    }

    #[test]
    fn observed_used_without_command() {
        let s = snap(json!({"etatBache": "OUVERTE"}));
        assert_eq!(resolve_cover(&s), Resolution::Observed(CoverState::Open));
    }

    #[test]
    fn nothing_present_is_unchanged() {
        let s = snap(json!({"humiditeSol": 10}));
        assert_eq!(resolve_pump(&s), Resolution::Unchanged);
        assert_eq!(resolve_cover(&s), Resolution::Unchanged);
    }

    #[test]
    fn actuators_resolve_independently() {
        let s = snap(json!({"commandes": {"bache": "ouvrir"}, "pompe": "ON"}));
        assert_eq!(resolve_cover(&s), Resolution::Command(CoverState::Open));
        assert_eq!(resolve_pump(&s), Resolution::Observed(PumpState::On));
    }

    // -- Mirror -------------------------------------------------------------

    #[test]
    fn initial_state_is_off_and_closed() {
        let m = ActuatorStateMirror::new();
        assert_eq!(m.pump(), PumpState::Off);
        assert_eq!(m.cover(), CoverState::Closed);
    }

    #[test]
    fn legacy_field_applies_once_command_field_is_gone() {
        let m = ActuatorStateMirror::new();
        m.apply(&snap(json!({"humiditeSol": 30, "commandes": {"pompe": "ON"}})));
        assert_eq!(m.pump(), PumpState::On);
        m.apply(&snap(json!({"pompe": "OFF"})));
        assert_eq!(m.pump(), PumpState::Off);
    }

    #[test]
    fn unchanged_keeps_previous_state() {
        let m = ActuatorStateMirror::new();
        m.apply(&snap(json!({"etatBache": "OUVERTE"})));
        let changes = m.apply(&snap(json!({"temperature": 20})));
        assert_eq!(changes, ActuatorChanges::default());
        assert_eq!(m.cover(), CoverState::Open);
    }

    #[test]
    fn changes_report_only_real_transitions() {
        let m = ActuatorStateMirror::new();
        let first = m.apply(&snap(json!({"commandes": {"pompe": "ON", "bache": "fermer"}})));
        assert_eq!(first.pump, Some(PumpState::On));
        // Cover was already closed.
        assert_eq!(first.cover, None);
        let again = m.apply(&snap(json!({"commandes": {"pompe": "ON"}})));
        assert_eq!(again.pump, None);
    }

    /// Optimistic race, asserted as-is: the device never applied the ON
    /// command and still reports OFF, but the mirror shows ON because the
    /// command field wins while it is present.
    #[test]
    fn optimistic_command_masks_device_failure() {
        let m = ActuatorStateMirror::new();
        m.apply(&snap(json!({"pompe": "OFF", "commandes": {"pompe": "ON"}})));
        m.apply(&snap(json!({"pompe": "OFF", "commandes": {"pompe": "ON"}})));
        assert_eq!(m.pump(), PumpState::On);
    }

    #[test]
    fn subscribers_only_wake_on_change() {
        let m = ActuatorStateMirror::new();
        let mut rx = m.subscribe_cover();
        m.apply(&snap(json!({"etatBache": "FERMEE"})));
        assert!(!rx.has_changed().unwrap());
        m.apply(&snap(json!({"etatBache": "OUVERTE"})));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), CoverState::Open);
    }
}
