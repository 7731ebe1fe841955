//! Automatic-mode decisions.
//!
//! A pure function of the latest reading and the mirrored actuator states.
//! Each rule only yields a command when it would change the actuator, so the
//! same reading evaluated again after convergence yields nothing.
//!
//! ```text
//! cover: raining  ─▶ OPEN    (collect rainwater)
//!        dry      ─▶ CLOSED
//! pump:  soil < 40 ─▶ ON
//!        soil >= 40 ─▶ OFF
//! ```

use crate::channel::RemoteWrite;
use crate::state::{CoverState, PumpState, SensorReading};

/// Soil humidity (%) below which the pump runs.
pub const SOIL_HUMIDITY_THRESHOLD: f64 = 40.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub pump: Option<PumpState>,
    pub cover: Option<CoverState>,
}

impl Decision {
    pub fn is_empty(&self) -> bool {
        self.pump.is_none() && self.cover.is_none()
    }

    pub fn writes(&self) -> Vec<RemoteWrite> {
        let mut out = Vec::with_capacity(2);
        if let Some(p) = self.pump {
            out.push(RemoteWrite::pump_command(p));
        }
        if let Some(c) = self.cover {
            out.push(RemoteWrite::cover_command(c));
        }
        out
    }
}

pub fn decide(reading: &SensorReading, pump: PumpState, cover: CoverState) -> Decision {
    let want_cover = if reading.is_raining {
        CoverState::Open
    } else {
        CoverState::Closed
    };
    let want_pump = if reading.soil_humidity < SOIL_HUMIDITY_THRESHOLD {
        PumpState::On
    } else {
        PumpState::Off
    };

    Decision {
        pump: (want_pump != pump).then_some(want_pump),
        cover: (want_cover != cover).then_some(want_cover),
    }
}
