//! Reactive driver for the SCR (Simulated Car Racing) server.

pub mod client;
pub mod config;
pub mod controller;
pub mod policy;
pub mod telemetry;
pub mod types;
pub mod wire;

pub use config::{DriverConfig, PolicyConfig, Stage};
pub use controller::Controller;
pub use telemetry::{CsvSink, NullSink, Recorder, TelemetryRecord, TelemetrySink};
pub use types::{ActuatorCommand, SensorSnapshot};
