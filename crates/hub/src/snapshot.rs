//! Typed, lenient view of the house record pushed by the remote store.
//!
//! Every field is optional and every malformed value degrades to "absent":
//! the mirrors then fall back to their zero defaults. Only a payload that is
//! not a JSON object at all is rejected.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::state::SensorReading;

/// `pluie` value that means it is raining; anything else means dry.
const RAIN_VALUE: &str = "pluie";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("snapshot is not a record (got {0})")]
    NotARecord(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteSnapshot {
    #[serde(default, deserialize_with = "lenient_number")]
    pub temperature: Option<f64>,
    #[serde(default, rename = "humiditeAir", deserialize_with = "lenient_number")]
    pub air_humidity: Option<f64>,
    #[serde(default, rename = "humiditeSol", deserialize_with = "lenient_number")]
    pub soil_humidity: Option<f64>,
    #[serde(default, rename = "pluie", deserialize_with = "lenient_string")]
    pub rain: Option<String>,
    #[serde(default, rename = "niveauEau", deserialize_with = "lenient_number")]
    pub water_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mode: Option<String>,
    /// Legacy observed pump state.
    #[serde(default, rename = "pompe", deserialize_with = "lenient_string")]
    pub pump: Option<String>,
    /// Legacy observed cover state.
    #[serde(default, rename = "etatBache", deserialize_with = "lenient_string")]
    pub cover: Option<String>,
    #[serde(default, rename = "commandes", deserialize_with = "lenient_commands")]
    pub commands: Option<Commands>,
}

/// The `commandes` sub-record: operator or automation intents.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Commands {
    #[serde(default, rename = "pompe", deserialize_with = "lenient_string")]
    pub pump: Option<String>,
    #[serde(default, rename = "bache", deserialize_with = "lenient_string")]
    pub cover: Option<String>,
}

impl RemoteSnapshot {
    pub fn parse(payload: &[u8]) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_slice(payload)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, SnapshotError> {
        match value {
            Value::Object(_) => Ok(Self::deserialize(value)?),
            Value::Null => Err(SnapshotError::NotARecord("null")),
            Value::Array(_) => Err(SnapshotError::NotARecord("array")),
            Value::Bool(_) => Err(SnapshotError::NotARecord("bool")),
            Value::Number(_) => Err(SnapshotError::NotARecord("number")),
            Value::String(_) => Err(SnapshotError::NotARecord("string")),
        }
    }

    pub fn is_raining(&self) -> bool {
        self.rain.as_deref() == Some(RAIN_VALUE)
    }

    /// Sensor values with every missing field defaulted.
    pub fn sensor_reading(&self) -> SensorReading {
        SensorReading {
            temperature: self.temperature.unwrap_or_default(),
            air_humidity: self.air_humidity.unwrap_or_default(),
            soil_humidity: self.soil_humidity.unwrap_or_default(),
            is_raining: self.is_raining(),
        }
    }

    pub fn water_percentage(&self) -> f64 {
        self.water_level.unwrap_or_default()
    }

    pub fn pump_command(&self) -> Option<&str> {
        self.commands.as_ref().and_then(|c| c.pump.as_deref())
    }

    pub fn cover_command(&self) -> Option<&str> {
        self.commands.as_ref().and_then(|c| c.cover.as_deref())
    }
}

/// Wire value written to `/pluie`.
pub fn rain_value(raining: bool) -> &'static str {
    if raining {
        RAIN_VALUE
    } else {
        "pas de pluie"
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoders
// ---------------------------------------------------------------------------

fn lenient_number<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(d)?;
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(n.filter(|n| n.is_finite()))
}

fn lenient_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(d)? {
        Value::String(s) if !s.is_empty() => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn lenient_commands<'de, D>(d: D) -> Result<Option<Commands>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(d)? {
        v @ Value::Object(_) => Ok(Commands::deserialize(v).ok()),
        _ => Ok(None),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
