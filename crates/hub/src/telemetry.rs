//! Latest sensor reading and tank level, mirrored from each snapshot.

use tokio::sync::watch;

use crate::alert::{AlertTransition, WaterLevelAlertMonitor};
use crate::snapshot::RemoteSnapshot;
use crate::state::{SensorReading, WaterLevel};

pub struct TelemetryMirror {
    reading: watch::Sender<SensorReading>,
    water: watch::Sender<WaterLevel>,
    label: String,
}

impl TelemetryMirror {
    pub fn new(tank_label: &str) -> Self {
        let (reading, _) = watch::channel(SensorReading::default());
        let (water, _) = watch::channel(WaterLevel::from_raw(0.0, tank_label));
        Self {
            reading,
            water,
            label: tank_label.to_string(),
        }
    }

    /// Overwrite both values from the snapshot and feed the new percentage to
    /// the alert gate.
    pub fn apply(
        &self,
        snapshot: &RemoteSnapshot,
        alert: &mut WaterLevelAlertMonitor,
    ) -> Option<AlertTransition> {
        let level = WaterLevel::from_raw(snapshot.water_percentage(), &self.label);
        let percentage = level.percentage;

        self.reading.send_replace(snapshot.sensor_reading());
        self.water.send_replace(level);

        alert.check(percentage)
    }

    pub fn reading(&self) -> SensorReading {
        *self.reading.borrow()
    }

    pub fn water_level(&self) -> WaterLevel {
        self.water.borrow().clone()
    }

    pub fn subscribe_reading(&self) -> watch::Receiver<SensorReading> {
        self.reading.subscribe()
    }

    pub fn subscribe_water_level(&self) -> watch::Receiver<WaterLevel> {
        self.water.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertState;
    use serde_json::json;

    fn snap(v: serde_json::Value) -> RemoteSnapshot {
        RemoteSnapshot::from_value(v).unwrap()
    }

    #[test]
    fn starts_zeroed() {
        let t = TelemetryMirror::new("Citerne");
        assert_eq!(t.reading(), SensorReading::default());
        assert_eq!(t.water_level().percentage, 0);
        assert_eq!(t.water_level().label, "Citerne");
    }

    #[test]
    fn snapshot_replaces_values_wholesale() {
        let t = TelemetryMirror::new("Citerne");
        let mut alert = WaterLevelAlertMonitor::new();
        t.apply(
            &snap(json!({"temperature": 22, "humiditeAir": 60, "humiditeSol": 45, "pluie": "pluie", "niveauEau": 80})),
            &mut alert,
        );
        // Second snapshot omits most fields: they fall back to zero, not to
        // the previous values.
        t.apply(&snap(json!({"humiditeSol": 30})), &mut alert);
        let r = t.reading();
        assert_eq!(r.temperature, 0.0);
        assert_eq!(r.air_humidity, 0.0);
        assert_eq!(r.soil_humidity, 30.0);
        assert!(!r.is_raining);
        assert_eq!(t.water_level().percentage, 0);
    }

    #[test]
    fn percentage_is_clamped() {
        let t = TelemetryMirror::new("Citerne");
        let mut alert = WaterLevelAlertMonitor::new();
        t.apply(&snap(json!({"niveauEau": 250})), &mut alert);
        assert_eq!(t.water_level().percentage, 100);
        t.apply(&snap(json!({"niveauEau": -30})), &mut alert);
        assert_eq!(t.water_level().percentage, 0);
    }

    #[test]
    fn every_snapshot_feeds_the_alert_gate() {
        let t = TelemetryMirror::new("Citerne");
        let mut alert = WaterLevelAlertMonitor::new();
        assert_eq!(t.apply(&snap(json!({"niveauEau": 50})), &mut alert), None);
        assert_eq!(
            t.apply(&snap(json!({"niveauEau": 12})), &mut alert),
            Some(AlertTransition::Raised)
        );
        assert_eq!(alert.state(), AlertState::Low);
        // Missing level counts as 0 and keeps the alert low without re-firing.
        assert_eq!(t.apply(&snap(json!({})), &mut alert), None);
    }

    #[test]
    fn subscribers_observe_updates() {
        let t = TelemetryMirror::new("Citerne");
        let mut rx = t.subscribe_reading();
        let mut alert = WaterLevelAlertMonitor::new();
        assert!(!rx.has_changed().unwrap());
        t.apply(&snap(json!({"humiditeSol": 12})), &mut alert);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().soil_humidity, 12.0);

        let water_rx = t.subscribe_water_level();
        t.apply(&snap(json!({"niveauEau": 64})), &mut alert);
        assert_eq!(water_rx.borrow().percentage, 64);
    }
}
