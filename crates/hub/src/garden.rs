//! The shared garden context: one owner per mirror, the mode controller, the
//! alert gate and the dispatcher, plus the operator actions that drive them.
//!
//! Snapshot ingestion order is fixed: telemetry (+ alert) → actuators → mode →
//! automatic decisions. A snapshot is applied completely under the caller's
//! write guard before the next one is looked at.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::actuator::ActuatorStateMirror;
use crate::alert::{AlertState, AlertTransition, WaterLevelAlertMonitor};
use crate::channel::RemoteWrite;
use crate::decision::decide;
use crate::dispatch::CommandDispatcher;
use crate::mode::ModeController;
use crate::snapshot::RemoteSnapshot;
use crate::state::{
    CoverState, EventKind, EventLog, GardenEvent, OperatingMode, PumpState, SensorReading,
    WaterLevel,
};
use crate::telemetry::TelemetryMirror;

/// Step used by the bench helpers that drain the tank or dry the soil.
const SIMULATION_STEP: u8 = 10;

pub type SharedGarden = Arc<RwLock<Garden>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuator {
    Pump,
    Cover,
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pump => f.write_str("pump"),
            Self::Cover => f.write_str("cover"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("automatic mode is active: switch to manual mode to control the {actuator}")]
    ManualControlRefused { actuator: Actuator },
}

/// Partial sensor overwrite for the bench helpers. Absent fields are not
/// written.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SensorUpdate {
    pub temperature: Option<f64>,
    pub soil_humidity: Option<f64>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub house_id: String,
    pub channel_connected: bool,
    pub uptime_secs: u64,
    pub mode: OperatingMode,
    pub sensors: SensorReading,
    pub water_level: WaterLevel,
    pub pump: PumpState,
    pub cover: CoverState,
    pub water_alert: AlertState,
    pub dispatch_failures: u64,
    pub events: Vec<GardenEvent>,
}

pub struct Garden {
    house_id: String,
    started_at: Instant,
    channel_connected: bool,
    /// No decision is taken before the first snapshot has been ingested.
    telemetry_seen: bool,
    telemetry: TelemetryMirror,
    actuators: ActuatorStateMirror,
    mode: ModeController,
    alert: WaterLevelAlertMonitor,
    dispatcher: CommandDispatcher,
    events: EventLog,
}

// ---------------------------------------------------------------------------
// Construction & accessors
// ---------------------------------------------------------------------------

impl Garden {
    pub fn new(house_id: &str, tank_label: &str, dispatcher: CommandDispatcher) -> Self {
        Self {
            house_id: house_id.to_string(),
            started_at: Instant::now(),
            channel_connected: false,
            telemetry_seen: false,
            telemetry: TelemetryMirror::new(tank_label),
            actuators: ActuatorStateMirror::new(),
            mode: ModeController::new(),
            alert: WaterLevelAlertMonitor::new(),
            dispatcher,
            events: EventLog::new(),
        }
    }

    pub fn shared(self) -> SharedGarden {
        Arc::new(RwLock::new(self))
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode.mode()
    }

    pub fn pump(&self) -> PumpState {
        self.actuators.pump()
    }

    pub fn cover(&self) -> CoverState {
        self.actuators.cover()
    }

    pub fn reading(&self) -> SensorReading {
        self.telemetry.reading()
    }

    pub fn water_level(&self) -> WaterLevel {
        self.telemetry.water_level()
    }

    pub fn alert_state(&self) -> AlertState {
        self.alert.state()
    }

    pub fn mode_controller(&self) -> &ModeController {
        &self.mode
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            house_id: self.house_id.clone(),
            channel_connected: self.channel_connected,
            uptime_secs: self.started_at.elapsed().as_secs(),
            mode: self.mode(),
            sensors: self.reading(),
            water_level: self.water_level(),
            pump: self.pump(),
            cover: self.cover(),
            water_alert: self.alert_state(),
            dispatch_failures: self.dispatcher.failures(),
            events: self.events.newest_first(),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot ingestion
// ---------------------------------------------------------------------------

impl Garden {
    pub fn ingest(&mut self, snapshot: &RemoteSnapshot) {
        let before = (self.telemetry.reading(), self.telemetry.water_level().percentage);
        let transition = self.telemetry.apply(snapshot, &mut self.alert);
        let r = self.telemetry.reading();
        let level = self.telemetry.water_level().percentage;
        // Unchanged readings stay out of the log so they cannot push out
        // alerts and refusals.
        if !self.telemetry_seen || before != (r, level) {
            self.events.push(
                EventKind::Telemetry,
                format!(
                    "temp={:.1} air={:.0}% soil={:.0}% rain={} tank={level}%",
                    r.temperature, r.air_humidity, r.soil_humidity, r.is_raining
                ),
            );
        }
        self.telemetry_seen = true;

        match transition {
            Some(AlertTransition::Raised) => {
                warn!(percentage = level, "water tank low");
                self.events
                    .push(EventKind::Alert, format!("water tank low ({level}%)"));
            }
            Some(AlertTransition::Rearmed) => {
                debug!(percentage = level, "water alert rearmed");
            }
            None => {}
        }

        let changes = self.actuators.apply(snapshot);
        if let Some(p) = changes.pump {
            info!(pump = %p, "pump state changed");
            self.events.push(EventKind::Actuator, format!("pump {p}"));
        }
        if let Some(c) = changes.cover {
            info!(cover = %c, "cover state changed");
            self.events.push(EventKind::Actuator, format!("cover {c}"));
        }

        if let Some(m) = self.mode.apply_remote(snapshot.mode.as_deref()) {
            info!(mode = %m, "mode changed remotely");
            self.events
                .push(EventKind::Mode, format!("mode set to {m} by remote"));
        }

        self.run_automation();
    }

    /// Evaluate the decision rules if in automatic mode and write whatever
    /// they yield.
    fn run_automation(&mut self) {
        if self.mode.mode() != OperatingMode::Automatic {
            return;
        }
        if !self.telemetry_seen {
            debug!("no snapshot yet, automatic decisions deferred");
            return;
        }
        let decision = decide(
            &self.telemetry.reading(),
            self.actuators.pump(),
            self.actuators.cover(),
        );
        for write in decision.writes() {
            info!(%write, "automatic decision");
            self.send(write);
        }
    }

    fn send(&mut self, write: RemoteWrite) {
        let detail = write.to_string();
        if self.dispatcher.dispatch(write) {
            self.events.push(EventKind::Command, detail);
        } else {
            self.events
                .push(EventKind::Error, format!("write dropped: {detail}"));
        }
    }
}

// ---------------------------------------------------------------------------
// Operator actions
// ---------------------------------------------------------------------------

impl Garden {
    /// Entering automatic mode evaluates the rules straight away rather than
    /// waiting for the next snapshot.
    pub fn set_mode(&mut self, mode: OperatingMode) -> bool {
        if !self.mode.set_mode(mode, &self.dispatcher) {
            return false;
        }
        self.mode_changed_by_operator(mode);
        true
    }

    pub fn toggle_mode(&mut self) -> OperatingMode {
        let next = self.mode.toggle(&self.dispatcher);
        self.mode_changed_by_operator(next);
        next
    }

    fn mode_changed_by_operator(&mut self, mode: OperatingMode) {
        self.events
            .push(EventKind::Mode, format!("mode set to {mode} by operator"));
        if mode == OperatingMode::Automatic {
            self.run_automation();
        }
    }

    /// Command the pump to the opposite of its mirrored state. The mirror
    /// itself only moves once the command shows up in a snapshot.
    pub fn toggle_pump(&mut self) -> Result<PumpState, ControlError> {
        self.ensure_manual(Actuator::Pump)?;
        let target = self.actuators.pump().toggled();
        self.send(RemoteWrite::pump_command(target));
        Ok(target)
    }

    pub fn toggle_cover(&mut self) -> Result<CoverState, ControlError> {
        self.ensure_manual(Actuator::Cover)?;
        let target = self.actuators.cover().toggled();
        self.send(RemoteWrite::cover_command(target));
        Ok(target)
    }

    fn ensure_manual(&mut self, actuator: Actuator) -> Result<(), ControlError> {
        if self.mode.is_manual_control_allowed() {
            return Ok(());
        }
        let err = ControlError::ManualControlRefused { actuator };
        warn!(%actuator, "manual control refused in automatic mode");
        self.events.push(EventKind::Refused, err.to_string());
        Err(err)
    }

    /// Write a full tank and clear the alert. The two are independent: the
    /// alert is cleared even if the write is dropped.
    pub fn refill_tank(&mut self) {
        self.send(RemoteWrite::water_level(100));
        self.alert.refill();
        info!("tank refill requested");
    }

    // -- Bench helpers: raw sensor writes, not mode-gated -------------------

    pub fn simulate_water_usage(&mut self) -> Option<u8> {
        let current = self.telemetry.water_level().percentage;
        if current == 0 {
            return None;
        }
        let next = current.saturating_sub(SIMULATION_STEP);
        self.send(RemoteWrite::water_level(next));
        Some(next)
    }

    pub fn simulate_rain(&mut self) -> bool {
        let next = !self.telemetry.reading().is_raining;
        self.send(RemoteWrite::rain(next));
        next
    }

    pub fn simulate_soil_drying(&mut self) -> Option<f64> {
        let current = self.telemetry.reading().soil_humidity;
        if current <= 0.0 {
            return None;
        }
        let next = (current - f64::from(SIMULATION_STEP)).max(0.0);
        self.send(RemoteWrite::soil_humidity(next));
        Some(next)
    }

    pub fn update_sensor_data(&mut self, update: SensorUpdate) {
        if let Some(t) = update.temperature {
            self.send(RemoteWrite::temperature(t));
        }
        if let Some(s) = update.soil_humidity {
            self.send(RemoteWrite::soil_humidity(s));
        }
    }

    pub fn update_water_level(&mut self, percentage: u8) {
        self.send(RemoteWrite::water_level(percentage.min(100)));
    }
}

// ---------------------------------------------------------------------------
// Channel bookkeeping
// ---------------------------------------------------------------------------

impl Garden {
    pub fn set_channel_connected(&mut self, connected: bool) {
        if self.channel_connected == connected {
            return;
        }
        self.channel_connected = connected;
        let detail = if connected {
            "channel connected"
        } else {
            "channel disconnected"
        };
        self.events.push(EventKind::System, detail);
    }

    pub fn record_error(&mut self, detail: String) {
        self.events.push(EventKind::Error, detail);
    }

    pub fn record_system(&mut self, detail: String) {
        self.events.push(EventKind::System, detail);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
