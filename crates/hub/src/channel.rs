//! The remote house store, seen from the hub: write paths, the sink trait the
//! core writes through, and the MQTT adapter.
//!
//! Snapshots arrive on `<prefix>/<house_id>` as the full JSON record. Writes
//! go out on `<prefix>/<house_id>/set/<path>` with a JSON value payload.

use rumqttc::{AsyncClient, QoS};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::snapshot::rain_value;
use crate::state::{CoverState, OperatingMode, PumpState};

// ---------------------------------------------------------------------------
// Write paths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemotePath {
    Mode,
    PumpCommand,
    CoverCommand,
    WaterLevel,
    Temperature,
    SoilHumidity,
    Rain,
}

impl RemotePath {
    pub const ALL: [RemotePath; 7] = [
        Self::Mode,
        Self::PumpCommand,
        Self::CoverCommand,
        Self::WaterLevel,
        Self::Temperature,
        Self::SoilHumidity,
        Self::Rain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mode => "/mode",
            Self::PumpCommand => "/commandes/pompe",
            Self::CoverCommand => "/commandes/bache",
            Self::WaterLevel => "/niveauEau",
            Self::Temperature => "/temperature",
            Self::SoilHumidity => "/humiditeSol",
            Self::Rain => "/pluie",
        }
    }

    /// Accepts the path with or without its leading slash.
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.strip_prefix('/').unwrap_or(s);
        Self::ALL
            .into_iter()
            .find(|p| &p.as_str()[1..] == wanted)
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single set operation against the house record.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWrite {
    pub path: RemotePath,
    pub value: Value,
}

impl RemoteWrite {
    pub fn new(path: RemotePath, value: impl Into<Value>) -> Self {
        Self {
            path,
            value: value.into(),
        }
    }

    pub fn mode(mode: OperatingMode) -> Self {
        Self::new(RemotePath::Mode, mode.as_remote())
    }

    pub fn pump_command(target: PumpState) -> Self {
        Self::new(RemotePath::PumpCommand, target.command_value())
    }

    pub fn cover_command(target: CoverState) -> Self {
        Self::new(RemotePath::CoverCommand, target.command_value())
    }

    pub fn water_level(percentage: u8) -> Self {
        Self::new(RemotePath::WaterLevel, percentage)
    }

    pub fn temperature(value: f64) -> Self {
        Self::new(RemotePath::Temperature, value)
    }

    pub fn soil_humidity(value: f64) -> Self {
        Self::new(RemotePath::SoilHumidity, value)
    }

    pub fn rain(raining: bool) -> Self {
        Self::new(RemotePath::Rain, rain_value(raining))
    }
}

impl fmt::Display for RemoteWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.path, self.value)
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to encode write: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("publish rejected: {0}")]
    Publish(String),
}

/// Write side of the remote store. Implementations must not block: the write
/// is handed off and the call returns.
pub trait RemoteSink: Send + Sync {
    fn set(&self, write: &RemoteWrite) -> Result<(), ChannelError>;
}

// ---------------------------------------------------------------------------
// MQTT adapter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
    house_id: String,
}

impl Topics {
    pub fn new(prefix: &str, house_id: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            house_id: house_id.to_string(),
        }
    }

    /// Topic carrying full-record snapshots.
    pub fn snapshot(&self) -> String {
        format!("{}/{}", self.prefix, self.house_id)
    }

    /// Topic for a single-path write.
    pub fn write(&self, path: RemotePath) -> String {
        format!("{}/{}/set{}", self.prefix, self.house_id, path.as_str())
    }

    pub fn is_snapshot(&self, topic: &str) -> bool {
        topic
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| rest == self.house_id)
    }
}

pub struct MqttSink {
    client: AsyncClient,
    topics: Topics,
}

impl MqttSink {
    pub fn new(client: AsyncClient, topics: Topics) -> Self {
        Self { client, topics }
    }
}

impl RemoteSink for MqttSink {
    fn set(&self, write: &RemoteWrite) -> Result<(), ChannelError> {
        let payload = serde_json::to_vec(&write.value)?;
        self.client
            .try_publish(self.topics.write(write.path), QoS::AtLeastOnce, false, payload)
            .map_err(|e| ChannelError::Publish(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// In-memory store (tests)
// ---------------------------------------------------------------------------


// ===========================================================================
// Tests
// ===========================================================================
