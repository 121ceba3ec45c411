use crate::config::{PolicyConfig, Stage};
use crate::policy::{self, Gearbox};
use crate::telemetry::{Recorder, RecorderStats};
use crate::types::{ActuatorCommand, SensorSnapshot};
use crate::wire::Message;

/// Reactive driver. One instance lives for the whole process; the gearbox RPM memory,
/// the last command and the telemetry recorder are its only state.
pub struct Controller {
    stage: Stage,
    policy: PolicyConfig,
    gearbox: Gearbox,
    command: ActuatorCommand,
    recorder: Recorder,
    ticks: u64,
}

impl Controller {
    pub fn new(stage: Stage, policy: PolicyConfig, recorder: Recorder) -> Self {
        Self {
            stage,
            policy,
            gearbox: Gearbox::new(),
            command: ActuatorCommand::default(),
            recorder,
            ticks: 0,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn gearbox(&self) -> &Gearbox {
        &self.gearbox
    }

    pub fn command(&self) -> &ActuatorCommand {
        &self.command
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Handshake payload configuring the rangefinders, e.g. `(init -90 -75 ... 90)`.
    pub fn init(&self) -> String {
        let mut msg = Message::new();
        msg.push("init", policy::rangefinder_angles());
        msg.to_string()
    }

    /// Decode a sensor datagram, run one tick and encode the resulting command.
    pub fn drive(&mut self, raw: &str) -> String {
        let snap = match Message::parse(raw) {
            Ok(msg) => SensorSnapshot::from_message(&msg),
            Err(e) => {
                tracing::warn!("undecodable sensor message ({}), driving blind", e);
                SensorSnapshot::default()
            }
        };
        self.tick(&snap).to_message().to_string()
    }

    /// steer → gear → speed → telemetry, in that order.
    pub fn tick(&mut self, snap: &SensorSnapshot) -> &ActuatorCommand {
        self.ticks += 1;

        self.command
            .set_steer(policy::steer(snap.angle, snap.track_pos, &self.policy));
        self.command
            .set_gear(self.gearbox.shift(snap.rpm, snap.gear, &self.policy));
        let accel = policy::next_accel(snap.speed_x, self.command.accel(), &self.policy);
        self.command.set_accel(accel);

        tracing::trace!(
            tick = self.ticks,
            steer = self.command.steer(),
            gear = self.command.gear(),
            accel = self.command.accel(),
            "tick"
        );

        self.recorder.capture(snap, &self.command);
        &self.command
    }

    /// Same command with the restart flag raised, sent when the step budget runs out.
    pub fn restart_request(&self) -> String {
        let mut cmd = self.command.clone();
        cmd.set_meta(true);
        cmd.to_message().to_string()
    }

    /// Close telemetry. Safe to call more than once.
    pub fn on_shutdown(&mut self) -> RecorderStats {
        let stats = self.recorder.close();
        tracing::info!(
            ticks = self.ticks,
            rows = stats.written,
            skipped = stats.skipped,
            "driver shut down"
        );
        stats
    }

    /// Keeps carried state (remembered RPM, last command) across a race restart.
    pub fn on_restart(&mut self) {
        tracing::info!(prev_rpm = ?self.gearbox.prev_rpm(), "race restart, keeping driver state");
    }
}
