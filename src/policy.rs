//! Per-tick decision logic. Every function here is pure except [`Gearbox::shift`],
//! which remembers the previous RPM reading to tell whether the engine is revving up.

use crate::config::PolicyConfig;
use crate::types::TRACK_SENSORS;

/// Rangefinder layout sent in the init handshake, in degrees.
///
/// Coarse 15° spacing towards the sides, fine 5° spacing ahead, one beam dead ahead.
pub fn rangefinder_angles() -> [i32; TRACK_SENSORS] {
    let mut angles = [0; TRACK_SENSORS];
    let last = TRACK_SENSORS - 1;

    for i in 0..5 {
        angles[i] = -90 + i as i32 * 15;
        angles[last - i] = 90 - i as i32 * 15;
    }
    for i in 5..9 {
        angles[i] = -20 + (i as i32 - 5) * 5;
        angles[last - i] = 20 - (i as i32 - 5) * 5;
    }

    angles
}

/// Steer towards the track axis: correct heading, pull back by half the lateral offset,
/// normalised by steer lock. Not clamped here.
pub fn steer(angle: Option<f64>, track_pos: Option<f64>, cfg: &PolicyConfig) -> f64 {
    match (angle, track_pos) {
        (Some(angle), Some(pos)) => (angle - pos * cfg.track_pos_gain) / cfg.steer_lock,
        _ => 0.0,
    }
}

/// Fixed-step throttle integrator around the target speed.
pub fn next_accel(speed: Option<f64>, prev_accel: f64, cfg: &PolicyConfig) -> f64 {
    let Some(speed) = speed else {
        return 0.0;
    };

    if speed < cfg.target_speed {
        (prev_accel + cfg.accel_step).min(1.0)
    } else {
        (prev_accel - cfg.accel_step).max(0.0)
    }
}

/// Gear-shift state machine. The only state carried between ticks is the last RPM seen.
#[derive(Debug, Clone, Default)]
pub struct Gearbox {
    prev_rpm: Option<f64>,
}

impl Gearbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prev_rpm(&self) -> Option<f64> {
        self.prev_rpm
    }

    /// Decide the next gear. Unknown inputs fall back to first gear and leave the
    /// remembered RPM alone.
    pub fn shift(&mut self, rpm: Option<f64>, gear: Option<i32>, cfg: &PolicyConfig) -> i32 {
        let (Some(rpm), Some(mut gear)) = (rpm, gear) else {
            return 1;
        };

        let rising = match self.prev_rpm {
            None => true,
            Some(prev) => prev - rpm < 0.0,
        };

        // Both checks run; they cancel out if somehow both hold.
        if rising && rpm > cfg.upshift_rpm {
            gear = gear.saturating_add(1);
        }
        if !rising && rpm < cfg.downshift_rpm {
            gear = gear.saturating_sub(1);
        }

        self.prev_rpm = Some(rpm);
        gear.max(1)
    }
}
