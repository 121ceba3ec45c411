use crate::wire::Message;

pub const TRACK_SENSORS: usize = 19;
pub const OPPONENT_SENSORS: usize = 36;

/// One tick's worth of sensor readings. Every field is `None` when the server
/// did not send it or the value failed to parse (`nan`/`inf` included).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSnapshot {
    pub speed_x: Option<f64>,          // longitudinal speed (km/h)
    pub track_pos: Option<f64>,        // 0 = axis, ±1 = track edge
    pub angle: Option<f64>,            // heading vs track axis (rad)
    pub rpm: Option<f64>,
    pub gear: Option<i32>,             // -1 reverse, 0 neutral
    pub track: Option<Vec<f64>>,       // rangefinders, laid out by the init handshake
    pub opponents: Option<Vec<f64>>,   // one per 10° sector around the car
    // extra readings, not used by the policy:
    pub cur_lap_time: Option<f64>,
    pub last_lap_time: Option<f64>,
    pub dist_from_start: Option<f64>,
    pub dist_raced: Option<f64>,
    pub damage: Option<f64>,
    pub fuel: Option<f64>,
    pub race_pos: Option<i32>,
    pub speed_y: Option<f64>,
    pub speed_z: Option<f64>,
    pub z: Option<f64>,
    pub wheel_spin_vel: Option<Vec<f64>>,
    pub focus: Option<Vec<f64>>,
}

impl SensorSnapshot {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            speed_x: msg.real("speedX"),
            track_pos: msg.real("trackPos"),
            angle: msg.real("angle"),
            rpm: msg.real("rpm"),
            gear: msg.scalar("gear"),
            track: msg.reals("track"),
            opponents: msg.reals("opponents"),
            cur_lap_time: msg.real("curLapTime"),
            last_lap_time: msg.real("lastLapTime"),
            dist_from_start: msg.real("distFromStart"),
            dist_raced: msg.real("distRaced"),
            damage: msg.real("damage"),
            fuel: msg.real("fuel"),
            race_pos: msg.scalar("racePos"),
            speed_y: msg.real("speedY"),
            speed_z: msg.real("speedZ"),
            z: msg.real("z"),
            wheel_spin_vel: msg.reals("wheelSpinVel"),
            focus: msg.reals("focus"),
        }
    }
}

/// Outputs sent back to the car. Setters clamp to the ranges the server accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCommand {
    accel: f64,
    brake: f64,
    steer: f64,
    gear: i32,
    clutch: f64,
    focus: i32,
    meta: u8,
}

impl Default for ActuatorCommand {
    fn default() -> Self {
        Self {
            accel: 0.0,
            brake: 0.0,
            steer: 0.0,
            gear: 1,
            clutch: 0.0,
            focus: 0,
            meta: 0,
        }
    }
}

impl ActuatorCommand {
    pub fn accel(&self) -> f64 {
        self.accel
    }

    pub fn brake(&self) -> f64 {
        self.brake
    }

    pub fn steer(&self) -> f64 {
        self.steer
    }

    pub fn gear(&self) -> i32 {
        self.gear
    }

    pub fn focus(&self) -> i32 {
        self.focus
    }

    pub fn set_accel(&mut self, accel: f64) {
        self.accel = clamp_or_zero(accel, 0.0, 1.0);
    }

    pub fn set_brake(&mut self, brake: f64) {
        self.brake = clamp_or_zero(brake, 0.0, 1.0);
    }

    pub fn set_steer(&mut self, steer: f64) {
        self.steer = clamp_or_zero(steer, -1.0, 1.0);
    }

    pub fn set_gear(&mut self, gear: i32) {
        self.gear = gear;
    }

    pub fn set_focus(&mut self, focus: i32) {
        self.focus = focus.clamp(-90, 90);
    }

    /// `true` asks the server to restart the race.
    pub fn set_meta(&mut self, restart: bool) {
        self.meta = u8::from(restart);
    }

    pub fn to_message(&self) -> Message {
        let mut msg = Message::new();
        msg.push("accel", [self.accel])
            .push("brake", [self.brake])
            .push("gear", [self.gear])
            .push("steer", [self.steer])
            .push("clutch", [self.clutch])
            .push("focus", [self.focus])
            .push("meta", [self.meta]);
        msg
    }
}

fn clamp_or_zero(v: f64, lo: f64, hi: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(lo, hi)
    }
}
