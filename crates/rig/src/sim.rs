//! Stateful house simulator for bench work without the real garden.
//!
//! Each tick models what the physical installation would report:
//! - The device acting on `commandes` (sometimes failing to)
//! - Soil drying, pump watering, tank draining
//! - Rain as a persistent on/off process
//! - An open cover in the rain refilling the tank
//! - Diurnal temperature and air humidity with sensor noise

use std::fmt;

use crate::record::HouseRecord;

/// Ticks in one simulated day.
pub const DIURNAL_PERIOD_TICKS: f64 = 240.0;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal(rng: &mut fastrand::Rng) -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += rng.f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(rng: &mut fastrand::Rng, mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal(rng)
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured weather profiles selectable via `SIM_SCENARIO` env var.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Warm and mostly dry. Soil crosses the watering threshold within a
    /// few dozen ticks, so the pump cycles regularly.
    Drying,
    /// Mild, slow drift. Good for poking at the UI without much happening.
    Stable,
    /// Frequent, long showers. Exercises the cover and the tank refill.
    Stormy,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "stormy" => Self::Stormy,
            _ => Self::Drying, // default
        }
    }

    pub fn physics(self) -> Physics {
        match self {
            Self::Drying => Physics {
                dry_per_tick: 1.5,
                rain_start_prob: 0.02,
                rain_stop_prob: 0.30,
                temp_mean: 26.0,
                ..Physics::default()
            },
            Self::Stable => Physics {
                dry_per_tick: 0.3,
                rain_start_prob: 0.01,
                rain_stop_prob: 0.50,
                temp_amplitude: 3.0,
                ..Physics::default()
            },
            Self::Stormy => Physics {
                dry_per_tick: 0.8,
                rain_start_prob: 0.25,
                rain_stop_prob: 0.10,
                temp_mean: 16.0,
                ..Physics::default()
            },
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drying => write!(f, "drying"),
            Self::Stable => write!(f, "stable"),
            Self::Stormy => write!(f, "stormy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Physics parameters
// ---------------------------------------------------------------------------

/// Per-tick rates. Humidities and tank level are percentages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Physics {
    pub dry_per_tick: f64,
    pub pump_wet_per_tick: f64,
    pub rain_wet_per_tick: f64,
    /// Tank points the pump uses per tick.
    pub pump_drain_per_tick: f64,
    /// Tank points gained per tick while raining with the cover open.
    pub refill_per_tick: f64,
    pub rain_start_prob: f64,
    pub rain_stop_prob: f64,
    pub temp_mean: f64,
    pub temp_amplitude: f64,
    pub noise_sigma: f64,
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            dry_per_tick: 1.0,
            pump_wet_per_tick: 4.0,
            rain_wet_per_tick: 2.0,
            pump_drain_per_tick: 2.0,
            refill_per_tick: 3.0,
            rain_start_prob: 0.05,
            rain_stop_prob: 0.30,
            temp_mean: 21.0,
            temp_amplitude: 6.0,
            noise_sigma: 0.3,
        }
    }
}

// ---------------------------------------------------------------------------
// Device actuation
// ---------------------------------------------------------------------------

/// What the device did with the pending commands on one tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Actuation {
    pub applied: Vec<&'static str>,
    pub faulted: Vec<&'static str>,
}

// ---------------------------------------------------------------------------
// Main simulator
// ---------------------------------------------------------------------------

pub struct RigSim {
    physics: Physics,
    /// Probability that the device ignores a pending command on a tick.
    fault_rate: f64,
    tick: u64,
    rng: fastrand::Rng,
}

impl RigSim {
    pub fn new(scenario: Scenario, fault_rate: f64) -> Self {
        Self::with_physics(scenario.physics(), fault_rate, fastrand::Rng::new())
    }

    pub fn with_physics(physics: Physics, fault_rate: f64, rng: fastrand::Rng) -> Self {
        Self {
            physics,
            fault_rate: fault_rate.clamp(0.0, 1.0),
            tick: 0,
            rng,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Carry pending `commandes` over to the observed `pompe` / `etatBache`
    /// fields. Each differing command independently fails with probability
    /// `fault_rate`, leaving the observed field stale until a later tick.
    pub fn actuate(&mut self, record: &mut HouseRecord) -> Actuation {
        let mut out = Actuation::default();

        let pump_target = match record.command("pompe") {
            Some("ON") => Some("ON"),
            Some("OFF") => Some("OFF"),
            _ => None,
        };
        if let Some(target) = pump_target {
            if record.text("pompe") != Some(target) {
                if self.faults() {
                    out.faulted.push("pompe");
                } else {
                    record.set("pompe", target);
                    out.applied.push("pompe");
                }
            }
        }

        let cover_target = match record.command("bache") {
            Some("ouvrir") => Some("OUVERTE"),
            Some("fermer") => Some("FERMEE"),
            _ => None,
        };
        if let Some(target) = cover_target {
            if record.text("etatBache") != Some(target) {
                if self.faults() {
                    out.faulted.push("etatBache");
                } else {
                    record.set("etatBache", target);
                    out.applied.push("etatBache");
                }
            }
        }

        out
    }

    /// Advance the house by one tick: actuation first, then physics.
    pub fn step(&mut self, record: &mut HouseRecord) -> Actuation {
        let actuation = self.actuate(record);
        self.tick += 1;
        let p = self.physics;

        // -- Rain (two-state Markov chain) --------------------------------
        let was_raining = record.text("pluie") == Some("pluie");
        let raining = if was_raining {
            self.rng.f64() >= p.rain_stop_prob
        } else {
            self.rng.f64() < p.rain_start_prob
        };
        record.set("pluie", if raining { "pluie" } else { "pas de pluie" });

        // -- Tank ---------------------------------------------------------
        let pump_on = record.text("pompe") == Some("ON");
        let cover_open = record.text("etatBache") == Some("OUVERTE");
        let tank = record.number("niveauEau");
        // A dry tank gives the pump nothing to move.
        let pumping = pump_on && tank > 0.0;

        let mut next_tank = tank;
        if pumping {
            next_tank -= p.pump_drain_per_tick;
        }
        if raining && cover_open {
            next_tank += p.refill_per_tick;
        }
        record.set("niveauEau", next_tank.round().clamp(0.0, 100.0) as u8);

        // -- Soil ---------------------------------------------------------
        let mut soil = record.number("humiditeSol") - p.dry_per_tick;
        if pumping {
            soil += p.pump_wet_per_tick;
        }
        if raining {
            soil += p.rain_wet_per_tick;
        }
        soil += gaussian(&mut self.rng, 0.0, p.noise_sigma);
        record.set("humiditeSol", round1(soil.clamp(0.0, 100.0)));

        // -- Air ----------------------------------------------------------
        // Peaks in the "afternoon" of the simulated day.
        let phase = 2.0 * std::f64::consts::PI * self.tick as f64 / DIURNAL_PERIOD_TICKS;
        let temp = p.temp_mean
            + p.temp_amplitude * phase.sin()
            + gaussian(&mut self.rng, 0.0, p.noise_sigma);
        let mut air = 60.0 - 1.5 * (temp - p.temp_mean);
        if raining {
            air += 25.0;
        }
        air += gaussian(&mut self.rng, 0.0, p.noise_sigma * 3.0);
        record.set("temperature", round1(temp));
        record.set("humiditeAir", round1(air.clamp(0.0, 100.0)));

        actuation
    }

    fn faults(&mut self) -> bool {
        self.rng.f64() < self.fault_rate
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dry_weather() -> Physics {
        Physics {
            rain_start_prob: 0.0,
            ..Scenario::Drying.physics()
        }
    }

    fn sim(physics: Physics, fault_rate: f64) -> RigSim {
        RigSim::with_physics(physics, fault_rate, fastrand::Rng::with_seed(7))
    }

    fn command(record: &mut HouseRecord, key: &str, value: &str) {
        record
            .apply_write(&format!("commandes/{key}"), json!(value))
            .unwrap();
    }

    // -- Actuation ------------------------------------------------------------

    #[test]
    fn commands_applied_without_faults() {
        let mut r = HouseRecord::seeded();
        command(&mut r, "pompe", "ON");
        command(&mut r, "bache", "ouvrir");
        let a = sim(dry_weather(), 0.0).actuate(&mut r);
        assert_eq!(a.applied, vec!["pompe", "etatBache"]);
        assert!(a.faulted.is_empty());
        assert_eq!(r.text("pompe"), Some("ON"));
        assert_eq!(r.text("etatBache"), Some("OUVERTE"));
    }

    #[test]
    fn every_command_faults_at_full_rate() {
        let mut r = HouseRecord::seeded();
        command(&mut r, "pompe", "ON");
        command(&mut r, "bache", "ouvrir");
        let a = sim(dry_weather(), 1.0).actuate(&mut r);
        assert!(a.applied.is_empty());
        assert_eq!(a.faulted, vec!["pompe", "etatBache"]);
        assert_eq!(r.text("pompe"), Some("OFF"));
        assert_eq!(r.text("etatBache"), Some("FERMEE"));
    }

    #[test]
    fn matching_commands_are_noops() {
        let mut r = HouseRecord::seeded();
        command(&mut r, "pompe", "OFF");
        command(&mut r, "bache", "fermer");
        let a = sim(dry_weather(), 1.0).actuate(&mut r);
        assert_eq!(a, Actuation::default());
    }

    #[test]
    fn unknown_command_values_ignored() {
        let mut r = HouseRecord::seeded();
        command(&mut r, "pompe", "maybe");
        let a = sim(dry_weather(), 0.0).actuate(&mut r);
        assert_eq!(a, Actuation::default());
        assert_eq!(r.text("pompe"), Some("OFF"));
    }

    // -- Physics --------------------------------------------------------------

    #[test]
    fn soil_dries_without_water() {
        let mut r = HouseRecord::seeded();
        let mut s = sim(dry_weather(), 0.0);
        for _ in 0..10 {
            s.step(&mut r);
        }
        assert!(r.number("humiditeSol") < 55.0, "soil: {}", r.number("humiditeSol"));
        assert_eq!(r.text("pluie"), Some("pas de pluie"));
    }

    #[test]
    fn pump_wets_soil_and_drains_tank() {
        let mut r = HouseRecord::seeded();
        command(&mut r, "pompe", "ON");
        let mut s = sim(dry_weather(), 0.0);
        for _ in 0..10 {
            s.step(&mut r);
        }
        assert!(r.number("humiditeSol") > 55.0, "soil: {}", r.number("humiditeSol"));
        assert_eq!(r.number("niveauEau"), 60.0);
    }

    #[test]
    fn empty_tank_stops_watering() {
        let mut r = HouseRecord::seeded();
        r.set("niveauEau", 0);
        command(&mut r, "pompe", "ON");
        let mut s = sim(dry_weather(), 0.0);
        for _ in 0..10 {
            s.step(&mut r);
        }
        assert_eq!(r.number("niveauEau"), 0.0);
        assert!(r.number("humiditeSol") < 55.0);
    }

    #[test]
    fn open_cover_in_rain_refills_tank() {
        let always_rain = Physics {
            rain_start_prob: 1.0,
            rain_stop_prob: 0.0,
            ..Scenario::Stormy.physics()
        };
        let mut r = HouseRecord::seeded();
        command(&mut r, "bache", "ouvrir");
        let mut s = sim(always_rain, 0.0);
        for _ in 0..5 {
            s.step(&mut r);
        }
        assert_eq!(r.text("pluie"), Some("pluie"));
        assert_eq!(r.number("niveauEau"), 95.0);
    }

    #[test]
    fn closed_cover_keeps_rain_out_of_tank() {
        let always_rain = Physics {
            rain_start_prob: 1.0,
            rain_stop_prob: 0.0,
            ..Scenario::Stormy.physics()
        };
        let mut r = HouseRecord::seeded();
        let mut s = sim(always_rain, 0.0);
        for _ in 0..5 {
            s.step(&mut r);
        }
        assert_eq!(r.number("niveauEau"), 80.0);
    }

    #[test]
    fn readings_stay_in_range() {
        let mut r = HouseRecord::seeded();
        command(&mut r, "pompe", "ON");
        command(&mut r, "bache", "ouvrir");
        let mut s = RigSim::new(Scenario::Stormy, 0.3);
        for _ in 0..500 {
            s.step(&mut r);
            for key in ["humiditeSol", "humiditeAir", "niveauEau"] {
                let v = r.number(key);
                assert!((0.0..=100.0).contains(&v), "{key} out of range: {v}");
            }
        }
        assert_eq!(s.tick(), 500);
    }

    #[test]
    fn fault_rate_is_clamped() {
        let mut r = HouseRecord::seeded();
        command(&mut r, "pompe", "ON");
        let a = sim(dry_weather(), 7.5).actuate(&mut r);
        assert_eq!(a.faulted, vec!["pompe"]);
    }

    // -- Scenario ---------------------------------------------------------------

    #[test]
    fn scenario_from_str_lossy() {
        assert_eq!(Scenario::from_str_lossy("drying"), Scenario::Drying);
        assert_eq!(Scenario::from_str_lossy("STABLE"), Scenario::Stable);
        assert_eq!(Scenario::from_str_lossy("Stormy"), Scenario::Stormy);
        assert_eq!(Scenario::from_str_lossy("unknown"), Scenario::Drying);
        assert_eq!(Scenario::from_str_lossy(""), Scenario::Drying);
    }

    #[test]
    fn scenario_display() {
        assert_eq!(Scenario::Drying.to_string(), "drying");
        assert_eq!(Scenario::Stable.to_string(), "stable");
        assert_eq!(Scenario::Stormy.to_string(), "stormy");
    }

    #[test]
    fn approx_std_normal_has_zero_mean() {
        let mut rng = fastrand::Rng::with_seed(42);
        let n = 5000;
        let sum: f64 = (0..n).map(|_| approx_std_normal(&mut rng)).sum();
        let mean = sum / n as f64;
        assert!(
            mean.abs() < 0.15,
            "approx_std_normal mean should be near zero: {mean}"
        );
    }
}
