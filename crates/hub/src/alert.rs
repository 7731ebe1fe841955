//! Low-water alert with a hysteresis gate at 20 %.

use serde::Serialize;

/// At or below this percentage the tank counts as low.
pub const LOW_WATER_THRESHOLD: u8 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    #[default]
    Normal,
    Low,
}

impl AlertState {
    pub fn is_low(self) -> bool {
        self == Self::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    /// Normal → Low. The only transition that warrants telling the operator.
    Raised,
    /// Low → Normal. Silent; the gate is armed again.
    Rearmed,
}

#[derive(Debug, Default)]
pub struct WaterLevelAlertMonitor {
    state: AlertState,
}

impl WaterLevelAlertMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn check(&mut self, percentage: u8) -> Option<AlertTransition> {
        match (self.state, percentage <= LOW_WATER_THRESHOLD) {
            (AlertState::Normal, true) => {
                self.state = AlertState::Low;
                Some(AlertTransition::Raised)
            }
            (AlertState::Low, false) => {
                self.state = AlertState::Normal;
                Some(AlertTransition::Rearmed)
            }
            _ => None,
        }
    }

    /// Force the gate back to normal, whatever the last reading said.
    pub fn refill(&mut self) {
        self.state = AlertState::Normal;
    }
}
