//! TOML config file loading and validation for the house the hub mirrors.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub house: HouseConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HouseConfig {
    /// Key of the house record in the remote store.
    pub house_id: String,
    /// Display label for the water tank.
    pub tank_label: String,
    /// First topic segment; records live under `<topic_prefix>/<house_id>`.
    pub topic_prefix: String,
}

impl Default for HouseConfig {
    fn default() -> Self {
        Self {
            house_id: "maison_1".to_string(),
            tank_label: "Citerne".to_string(),
            topic_prefix: "maisons".to_string(),
        }
    }
}

/// Characters that would break the topic layout.
const FORBIDDEN_TOPIC_CHARS: &[char] = &['+', '#'];

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_house(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_house(&self, errors: &mut Vec<String>) {
        let h = &self.house;

        if h.house_id.trim().is_empty() {
            errors.push("house.house_id is empty".to_string());
        } else if h.house_id.contains('/') {
            errors.push(format!(
                "house.house_id '{}' must be a single path segment (no '/')",
                h.house_id
            ));
        }
        if h.house_id.contains(FORBIDDEN_TOPIC_CHARS) {
            errors.push(format!(
                "house.house_id '{}' contains an MQTT wildcard",
                h.house_id
            ));
        }
        if h.house_id.chars().any(char::is_whitespace) {
            errors.push(format!(
                "house.house_id '{}' contains whitespace",
                h.house_id
            ));
        }

        if h.tank_label.trim().is_empty() {
            errors.push("house.tank_label is empty".to_string());
        }

        if h.topic_prefix.trim().is_empty() {
            errors.push("house.topic_prefix is empty".to_string());
        } else if h.topic_prefix.starts_with('/') || h.topic_prefix.ends_with('/') {
            errors.push(format!(
                "house.topic_prefix '{}' must not start or end with '/'",
                h.topic_prefix
            ));
        }
        if h.topic_prefix.contains(FORBIDDEN_TOPIC_CHARS) {
            errors.push(format!(
                "house.topic_prefix '{}' contains an MQTT wildcard",
                h.topic_prefix
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

/// Like [`load`], but a missing file yields the defaults.
pub fn load_or_default(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        tracing::info!(path, "no config file, using defaults");
        return Ok(Config::default());
    }
    load(path)
}

// ===========================================================================
// Tests
// ===========================================================================
