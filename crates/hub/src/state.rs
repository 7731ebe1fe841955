use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use time::OffsetDateTime;

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Telemetry values
// ---------------------------------------------------------------------------

/// One full set of rig sensor values. Replaced wholesale on every snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SensorReading {
    pub temperature: f64,
    pub air_humidity: f64,
    pub soil_humidity: f64,
    pub is_raining: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaterLevel {
    /// Always within 0..=100.
    pub percentage: u8,
    pub label: String,
}

impl WaterLevel {
    /// Round a raw tank reading to the nearest percent and clamp it into
    /// `[0, 100]`.
    pub fn from_raw(raw: f64, label: &str) -> Self {
        let percentage = if raw.is_finite() {
            raw.round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        Self {
            percentage,
            label: label.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PumpState {
    On,
    #[default]
    Off,
}

impl PumpState {
    /// Command-field mapping: only `"ON"` means on.
    pub fn from_command(raw: &str) -> Self {
        if raw == "ON" {
            Self::On
        } else {
            Self::Off
        }
    }

    /// Legacy observed-field mapping; same vocabulary as the command field.
    pub fn from_observed(raw: &str) -> Self {
        Self::from_command(raw)
    }

    /// Value written to `/commandes/pompe`.
    pub fn command_value(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

impl fmt::Display for PumpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_value())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoverState {
    Open,
    #[default]
    Closed,
}

impl CoverState {
    /// Command-field mapping: `"ouvrir"` opens, anything else closes.
    pub fn from_command(raw: &str) -> Self {
        if raw == "ouvrir" {
            Self::Open
        } else {
            Self::Closed
        }
    }

    /// Legacy `etatBache` mapping: `"OUVERTE"` is open, anything else closed.
    pub fn from_observed(raw: &str) -> Self {
        if raw == "OUVERTE" {
            Self::Open
        } else {
            Self::Closed
        }
    }

    /// Value written to `/commandes/bache`.
    pub fn command_value(self) -> &'static str {
        match self {
            Self::Open => "ouvrir",
            Self::Closed => "fermer",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Open => Self::Closed,
            Self::Closed => Self::Open,
        }
    }
}

impl fmt::Display for CoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("OPEN"),
            Self::Closed => f.write_str("CLOSED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Operating mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    #[default]
    Automatic,
    Manual,
}

impl OperatingMode {
    /// Value stored under `/mode` in the house record.
    pub fn as_remote(self) -> &'static str {
        match self {
            Self::Automatic => "automatique",
            Self::Manual => "manuel",
        }
    }

    /// Parse the remote `mode` field. Empty means "not set"; any value other
    /// than `"automatique"` counts as manual.
    pub fn from_remote(raw: &str) -> Option<Self> {
        match raw {
            "" => None,
            "automatique" => Some(Self::Automatic),
            _ => Some(Self::Manual),
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => f.write_str("automatic"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct GardenEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Telemetry,
    Actuator,
    Mode,
    Alert,
    Command,
    Refused,
    Error,
    System,
}

/// Bounded history of what the hub saw and did, newest entries last.
#[derive(Debug, Default)]
pub struct EventLog {
    events: VecDeque<GardenEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: VecDeque::with_capacity(MAX_EVENTS),
        }
    }

    pub fn push(&mut self, kind: EventKind, detail: impl Into<String>) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(GardenEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail: detail.into(),
        });
    }

    pub fn newest_first(&self) -> Vec<GardenEvent> {
        self.events.iter().rev().cloned().collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
