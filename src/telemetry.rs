//! Per-tick telemetry capture.
//!
//! Capture is best-effort: nothing in here may fail a tick. Rejected records and sink
//! errors are logged, and an I/O error switches the recorder off for the rest of the run.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::types::{ActuatorCommand, SensorSnapshot, OPPONENT_SENSORS, TRACK_SENSORS};

/// Substituted for a missing rangefinder sequence.
pub const TRACK_SENTINEL: f64 = 0.0;
/// Substituted for a missing opponent sequence ("nothing within range").
pub const OPPONENT_SENTINEL: f64 = 200.0;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("{field} has {got} values, expected {expected}")]
    SequenceLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("sink already closed")]
    Closed,
    #[error("telemetry I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One CSV row: the inputs of a tick and the command it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub speed_x: f64,
    pub track_pos: f64,
    pub angle: f64,
    pub rpm: f64,
    pub gear: i32,
    pub track: Vec<f64>,
    pub opponents: Vec<f64>,
    pub accel: f64,
    pub brake: f64,
    pub steer: f64,
    pub gear_out: i32,
}

impl TelemetryRecord {
    pub fn assemble(snap: &SensorSnapshot, cmd: &ActuatorCommand) -> Result<Self, TelemetryError> {
        let track = snap
            .track
            .clone()
            .unwrap_or_else(|| vec![TRACK_SENTINEL; TRACK_SENSORS]);
        let opponents = snap
            .opponents
            .clone()
            .unwrap_or_else(|| vec![OPPONENT_SENTINEL; OPPONENT_SENSORS]);

        check_len("track", &track, TRACK_SENSORS)?;
        check_len("opponents", &opponents, OPPONENT_SENSORS)?;

        Ok(Self {
            speed_x: snap.speed_x.ok_or(TelemetryError::MissingField("speedX"))?,
            track_pos: snap.track_pos.ok_or(TelemetryError::MissingField("trackPos"))?,
            angle: snap.angle.ok_or(TelemetryError::MissingField("angle"))?,
            rpm: snap.rpm.ok_or(TelemetryError::MissingField("rpm"))?,
            gear: snap.gear.ok_or(TelemetryError::MissingField("gear"))?,
            track,
            opponents,
            accel: cmd.accel(),
            brake: cmd.brake(),
            steer: cmd.steer(),
            gear_out: cmd.gear(),
        })
    }

    pub fn header() -> String {
        let mut cols: Vec<String> = ["speedX", "trackPos", "angle", "rpm", "gear"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        cols.extend((0..TRACK_SENSORS).map(|i| format!("track_{}", i)));
        cols.extend((0..OPPONENT_SENSORS).map(|i| format!("opponent_{}", i)));
        cols.extend(["accel", "brake", "steer", "gear_out"].map(String::from));
        cols.join(",")
    }

    pub fn to_csv_row(&self) -> String {
        let mut row = format!(
            "{},{},{},{},{}",
            self.speed_x, self.track_pos, self.angle, self.rpm, self.gear
        );
        for v in self.track.iter().chain(&self.opponents) {
            let _ = write!(row, ",{}", v);
        }
        let _ = write!(
            row,
            ",{},{},{},{}",
            self.accel, self.brake, self.steer, self.gear_out
        );
        row
    }
}

fn check_len(field: &'static str, values: &[f64], expected: usize) -> Result<(), TelemetryError> {
    if values.len() != expected {
        return Err(TelemetryError::SequenceLength {
            field,
            expected,
            got: values.len(),
        });
    }
    Ok(())
}

/// Destination for accepted records.
pub trait TelemetrySink {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError>;

    /// Flush and release the sink. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), TelemetryError>;
}

/// Append-only CSV file, truncated on creation.
pub struct CsvSink {
    writer: Option<BufWriter<File>>,
}

impl CsvSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{}", TelemetryRecord::header())?;
        Ok(Self {
            writer: Some(writer),
        })
    }
}

impl TelemetrySink for CsvSink {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        let writer = self.writer.as_mut().ok_or(TelemetryError::Closed)?;
        writeln!(writer, "{}", record.to_csv_row())?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TelemetryError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn append(&mut self, _record: &TelemetryRecord) -> Result<(), TelemetryError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Active,
    Disabled,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub written: u64,
    pub skipped: u64,
}

/// Owns the sink for the lifetime of the controller.
pub struct Recorder {
    sink: Box<dyn TelemetrySink>,
    state: RecorderState,
    stats: RecorderStats,
}

impl Recorder {
    pub fn new(sink: Box<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            state: RecorderState::Active,
            stats: RecorderStats::default(),
        }
    }

    /// A recorder that never writes.
    pub fn disabled() -> Self {
        Self {
            sink: Box::new(NullSink),
            state: RecorderState::Disabled,
            stats: RecorderStats::default(),
        }
    }

    /// Open a CSV sink, or fall back to a disabled recorder if the file can't be created.
    pub fn csv(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match CsvSink::create(path) {
            Ok(sink) => {
                tracing::info!("telemetry -> {}", path.display());
                Self::new(Box::new(sink))
            }
            Err(e) => {
                tracing::warn!("telemetry disabled, cannot open {}: {}", path.display(), e);
                Self::disabled()
            }
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// Record one tick. Returns whether a row was appended.
    pub fn capture(&mut self, snap: &SensorSnapshot, cmd: &ActuatorCommand) -> bool {
        if self.state != RecorderState::Active {
            return false;
        }

        let result =
            TelemetryRecord::assemble(snap, cmd).and_then(|record| self.sink.append(&record));

        match result {
            Ok(()) => {
                self.stats.written += 1;
                true
            }
            Err(TelemetryError::Io(e)) => {
                tracing::warn!("telemetry write failed, disabling capture: {}", e);
                self.stats.skipped += 1;
                self.state = RecorderState::Disabled;
                false
            }
            Err(e) => {
                tracing::warn!("telemetry row skipped: {}", e);
                self.stats.skipped += 1;
                false
            }
        }
    }

    /// Flush and close the sink. Only the first call touches the sink.
    pub fn close(&mut self) -> RecorderStats {
        if self.state == RecorderState::Closed {
            return self.stats;
        }
        if let Err(e) = self.sink.close() {
            tracing::warn!("telemetry close failed: {}", e);
        }
        self.state = RecorderState::Closed;
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct MemorySink {
        rows: Rc<RefCell<Vec<TelemetryRecord>>>,
        closes: Rc<RefCell<u32>>,
    }

    impl TelemetrySink for MemorySink {
        fn append(&mut self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
            self.rows.borrow_mut().push(record.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<(), TelemetryError> {
            *self.closes.borrow_mut() += 1;
            Ok(())
        }
    }

    struct BrokenSink;

    impl TelemetrySink for BrokenSink {
        fn append(&mut self, _record: &TelemetryRecord) -> Result<(), TelemetryError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }

        fn close(&mut self) -> Result<(), TelemetryError> {
            Ok(())
        }
    }

    fn full_snapshot() -> SensorSnapshot {
        SensorSnapshot {
            speed_x: Some(55.0),
            track_pos: Some(0.1),
            angle: Some(-0.02),
            rpm: Some(5200.0),
            gear: Some(2),
            track: Some((0..19).map(|i| i as f64).collect()),
            opponents: Some(vec![200.0; 36]),
            ..Default::default()
        }
    }

    #[test]
    fn test_header_columns() {
        let header = TelemetryRecord::header();
        let cols: Vec<&str> = header.split(',').collect();
        assert_eq!(cols.len(), 5 + 19 + 36 + 4);
        assert_eq!(cols[0], "speedX");
        assert_eq!(cols[5], "track_0");
        assert_eq!(cols[23], "track_18");
        assert_eq!(cols[24], "opponent_0");
        assert_eq!(cols[59], "opponent_35");
        assert_eq!(cols[63], "gear_out");
    }

    #[test]
    fn test_assemble_full_tick() {
        let mut cmd = ActuatorCommand::default();
        cmd.set_accel(0.3);
        cmd.set_gear(3);
        let rec = TelemetryRecord::assemble(&full_snapshot(), &cmd).unwrap();
        assert_eq!(rec.rpm, 5200.0);
        assert_eq!(rec.gear_out, 3);
        assert_eq!(rec.to_csv_row().split(',').count(), 64);
    }

    #[test]
    fn test_missing_sequences_use_sentinels() {
        let snap = SensorSnapshot {
            track: None,
            opponents: None,
            ..full_snapshot()
        };
        let rec = TelemetryRecord::assemble(&snap, &ActuatorCommand::default()).unwrap();
        assert_eq!(rec.track, vec![0.0; 19]);
        assert_eq!(rec.opponents, vec![200.0; 36]);
    }

    #[test]
    fn test_rejects_missing_scalar() {
        let snap = SensorSnapshot {
            rpm: None,
            ..full_snapshot()
        };
        let err = TelemetryRecord::assemble(&snap, &ActuatorCommand::default()).unwrap_err();
        assert!(matches!(err, TelemetryError::MissingField("rpm")));
    }

    #[test]
    fn test_rejects_short_sequence() {
        let snap = SensorSnapshot {
            track: Some(vec![1.0; 18]),
            ..full_snapshot()
        };
        let err = TelemetryRecord::assemble(&snap, &ActuatorCommand::default()).unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::SequenceLength { field: "track", expected: 19, got: 18 }
        ));
    }

    #[test]
    fn test_rejects_short_opponent_sequence() {
        let snap = SensorSnapshot {
            opponents: Some(vec![1.0; 3]),
            ..full_snapshot()
        };
        let err = TelemetryRecord::assemble(&snap, &ActuatorCommand::default()).unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::SequenceLength { field: "opponents", expected: 36, got: 3 }
        ));

        let mut rec = Recorder::new(Box::new(MemorySink::default()));
        assert!(!rec.capture(&snap, &ActuatorCommand::default()));
        assert_eq!(rec.stats(), RecorderStats { written: 0, skipped: 1 });
    }

    #[test]
    fn test_recorder_counts_and_closes_once() {
        let sink = MemorySink::default();
        let mut rec = Recorder::new(Box::new(sink.clone()));
        let cmd = ActuatorCommand::default();

        assert!(rec.capture(&full_snapshot(), &cmd));
        assert!(!rec.capture(&SensorSnapshot::default(), &cmd));
        assert_eq!(sink.rows.borrow().len(), 1);

        let stats = rec.close();
        assert_eq!(stats, RecorderStats { written: 1, skipped: 1 });
        rec.close();
        assert_eq!(*sink.closes.borrow(), 1);
        assert!(!rec.capture(&full_snapshot(), &cmd), "closed recorder must not write");
    }

    #[test]
    fn test_io_failure_disables_capture() {
        let mut rec = Recorder::new(Box::new(BrokenSink));
        let cmd = ActuatorCommand::default();
        assert!(!rec.capture(&full_snapshot(), &cmd));
        assert_eq!(rec.state(), RecorderState::Disabled);
        assert!(!rec.capture(&full_snapshot(), &cmd));
        assert_eq!(rec.stats().skipped, 1);
    }

    #[test]
    fn test_csv_sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.csv");
        let mut rec = Recorder::csv(&path);
        assert_eq!(rec.state(), RecorderState::Active);

        rec.capture(&full_snapshot(), &ActuatorCommand::default());
        rec.close();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], TelemetryRecord::header());
        assert!(lines[1].starts_with("55,0.1,-0.02,5200,2,0,1,2,"));
    }

    #[test]
    fn test_unopenable_path_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let rec = Recorder::csv(dir.path().join("missing").join("t.csv"));
        assert_eq!(rec.state(), RecorderState::Disabled);
    }
}
