//! Garden hub: mirrors a remote house record, reconciles actuator commands
//! against observed state, runs the automatic-mode rules and tracks the
//! low-water alert.

pub mod actuator;
pub mod alert;
pub mod channel;
pub mod config;
pub mod decision;
pub mod dispatch;
pub mod garden;
pub mod mode;
pub mod snapshot;
pub mod state;
pub mod telemetry;
pub mod web;
