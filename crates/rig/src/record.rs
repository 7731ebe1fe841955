//! The house record the rig serves: a JSON tree that accepts single-path
//! writes and is republished whole after every change.

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};

pub struct HouseRecord {
    root: Value,
}

impl HouseRecord {
    /// A freshly installed rig: automatic mode, moist soil, tank mostly full,
    /// pump off, cover closed, no pending commands.
    pub fn seeded() -> Self {
        Self {
            root: json!({
                "temperature": 21.0,
                "humiditeAir": 55.0,
                "humiditeSol": 55.0,
                "pluie": "pas de pluie",
                "niveauEau": 80,
                "mode": "automatique",
                "pompe": "OFF",
                "etatBache": "FERMEE"
            }),
        }
    }

    /// Set the value at `path` ("commandes/pompe", "/niveauEau", ...),
    /// creating intermediate records as needed.
    pub fn apply_write(&mut self, path: &str, value: Value) -> Result<()> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            bail!("invalid record path '{path}'");
        }

        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => bail!("invalid record path '{path}'"),
        };
        let mut node = &mut self.root;
        for seg in parents {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(obj) = node else {
                bail!("record path '{path}' crosses a non-record value");
            };
            node = obj
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        match node {
            Value::Object(obj) => {
                obj.insert(last.to_string(), value);
            }
            other => {
                let mut obj = Map::new();
                obj.insert(last.to_string(), value);
                *other = Value::Object(obj);
            }
        }
        Ok(())
    }

    pub fn number(&self, key: &str) -> f64 {
        self.root.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.root.get(key).and_then(Value::as_str)
    }

    /// Pending intent under `commandes/<key>`.
    pub fn command(&self, key: &str) -> Option<&str> {
        self.root
            .get("commandes")
            .and_then(|c| c.get(key))
            .and_then(Value::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        if let Value::Object(obj) = &mut self.root {
            obj.insert(key.to_string(), value.into());
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.root)?)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

/// Extract the record path from "<prefix>/<house_id>/set/<path...>".
pub fn extract_write_path<'a>(topic: &'a str, prefix: &str, house_id: &str) -> Option<&'a str> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let rest = rest.strip_prefix(house_id)?.strip_prefix("/set/")?;
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Decode a write payload. Anything that is not JSON is taken as a bare
/// string, so `mosquitto_pub -m ON` works as well as `-m '"ON"'`.
pub fn decode_value(payload: &[u8]) -> Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).trim().to_string()))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- apply_write ---------------------------------------------------------

    #[test]
    fn seeded_record_is_consistent() {
        let r = HouseRecord::seeded();
        assert_eq!(r.text("mode"), Some("automatique"));
        assert_eq!(r.number("niveauEau"), 80.0);
        assert_eq!(r.command("pompe"), None);
    }

    #[test]
    fn top_level_write() {
        let mut r = HouseRecord::seeded();
        r.apply_write("/niveauEau", json!(100)).unwrap();
        assert_eq!(r.number("niveauEau"), 100.0);
    }

    #[test]
    fn nested_write_creates_commandes() {
        let mut r = HouseRecord::seeded();
        r.apply_write("commandes/pompe", json!("ON")).unwrap();
        r.apply_write("commandes/bache", json!("ouvrir")).unwrap();
        assert_eq!(r.command("pompe"), Some("ON"));
        assert_eq!(r.command("bache"), Some("ouvrir"));
    }

    #[test]
    fn write_over_scalar_parent_replaces_it() {
        let mut r = HouseRecord::seeded();
        r.apply_write("commandes", json!("junk")).unwrap();
        r.apply_write("commandes/pompe", json!("OFF")).unwrap();
        assert_eq!(r.command("pompe"), Some("OFF"));
    }

    #[test]
    fn empty_segments_rejected() {
        let mut r = HouseRecord::seeded();
        assert!(r.apply_write("", json!(1)).is_err());
        assert!(r.apply_write("commandes//pompe", json!(1)).is_err());
    }

    #[test]
    fn payload_is_the_whole_record() {
        let r = HouseRecord::seeded();
        let v: Value = serde_json::from_slice(&r.to_payload().unwrap()).unwrap();
        assert_eq!(&v, r.as_value());
    }

    // -- extract_write_path ---------------------------------------------------

    #[test]
    fn extract_write_path_valid() {
        assert_eq!(
            extract_write_path("maisons/maison_1/set/commandes/pompe", "maisons", "maison_1"),
            Some("commandes/pompe")
        );
        assert_eq!(
            extract_write_path("maisons/maison_1/set/mode", "maisons", "maison_1"),
            Some("mode")
        );
    }

    #[test]
    fn extract_write_path_other_house() {
        assert_eq!(
            extract_write_path("maisons/maison_2/set/mode", "maisons", "maison_1"),
            None
        );
    }

    #[test]
    fn extract_write_path_snapshot_topic() {
        assert_eq!(extract_write_path("maisons/maison_1", "maisons", "maison_1"), None);
    }

    #[test]
    fn extract_write_path_empty_path() {
        assert_eq!(extract_write_path("maisons/maison_1/set/", "maisons", "maison_1"), None);
    }

    // -- decode_value ---------------------------------------------------------

    #[test]
    fn decode_json_values() {
        assert_eq!(decode_value(br#""ON""#), json!("ON"));
        assert_eq!(decode_value(b"100"), json!(100));
    }

    #[test]
    fn decode_bare_string() {
        assert_eq!(decode_value(b"ouvrir\n"), json!("ouvrir"));
    }
}
