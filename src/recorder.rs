//! Activity recording for one test run
//!
//! Builds the message sequence activity-file consumers expect from a stream of
//! speed readings:
//!
//! ```text
//! file_id, event(timer start), record*, event(timer stop), lap, session, activity
//! ```
//!
//! Fields use catalogue typing so every record shares one layout regardless of the
//! first sample's magnitudes.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, trace};

use crate::config::RunConfig;
use crate::fit::{
    ActivityFileEncoder, ActivityMessage, EncoderOptions, FieldTyping, FieldValue, FinishedFile,
    global,
};
use crate::types::{GeoPosition, SpeedReading};
use crate::{Result, TelemetryError};

// Profile enum values written by the recorder.
const FILE_TYPE_ACTIVITY: u8 = 4;
const MANUFACTURER_DEVELOPMENT: i64 = 255;
const EVENT_TIMER: u8 = 0;
const EVENT_LAP: u8 = 9;
const EVENT_SESSION: u8 = 8;
const EVENT_ACTIVITY: u8 = 26;
const EVENT_TYPE_START: u8 = 0;
const EVENT_TYPE_STOP: u8 = 1;
const EVENT_TYPE_STOP_ALL: u8 = 4;
const SPORT_CYCLING: u8 = 2;
const SUB_SPORT_GENERIC: u8 = 0;
const SESSION_TRIGGER_ACTIVITY_END: u8 = 0;
const ACTIVITY_TYPE_MANUAL: u8 = 0;

/// sint32 invalid marker, written when a record has no position fix.
const INVALID_SINT32: i32 = i32::MAX;

/// Identity written into the file_id message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer: u16,
    pub product: u16,
    pub serial_number: u32,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self { manufacturer: MANUFACTURER_DEVELOPMENT as u16, product: 1, serial_number: 1 }
    }
}

/// One telemetry sample to record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordSample {
    pub timestamp: SystemTime,
    pub speed_mps: f64,
    /// Distance since the lap started
    pub distance_m: f64,
    pub position: Option<GeoPosition>,
}

impl RecordSample {
    /// Sample a published reading at wall-clock time `timestamp`.
    pub fn from_reading(reading: &SpeedReading, timestamp: SystemTime) -> Self {
        Self {
            timestamp,
            speed_mps: reading.speed_mps(),
            distance_m: reading.distance_m,
            position: reading.position,
        }
    }
}

/// Running totals over the recorded samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    pub records: usize,
    pub elapsed: Duration,
    pub distance_m: f64,
    pub max_speed_mps: f64,
}

impl RunSummary {
    pub fn avg_speed_mps(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 { self.distance_m / seconds } else { 0.0 }
    }
}

/// Records one run into an activity file.
pub struct ActivityRecorder<W: Write> {
    encoder: Option<ActivityFileEncoder<W>>,
    identity: DeviceIdentity,
    started_at: Option<SystemTime>,
    summary: RunSummary,
}

impl ActivityRecorder<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, identity: DeviceIdentity, config: &RunConfig) -> Result<Self> {
        let encoder = ActivityFileEncoder::create(path, Self::options(config))?;
        Ok(Self::with_encoder(encoder, identity))
    }
}

impl<W: Write> ActivityRecorder<W> {
    pub fn new(sink: W, identity: DeviceIdentity, config: &RunConfig) -> Self {
        Self::with_encoder(ActivityFileEncoder::new(sink, Self::options(config)), identity)
    }

    fn options(config: &RunConfig) -> EncoderOptions {
        EncoderOptions { typing: FieldTyping::Catalogue, ..EncoderOptions::from(config) }
    }

    fn with_encoder(encoder: ActivityFileEncoder<W>, identity: DeviceIdentity) -> Self {
        Self { encoder: Some(encoder), identity, started_at: None, summary: RunSummary::default() }
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Write file_id and the timer start event.
    pub fn start(&mut self, started_at: SystemTime) -> Result<()> {
        if self.started_at.is_some() {
            return Err(TelemetryError::AlreadyStarted { what: "activity recording" });
        }
        let identity = self.identity;
        let encoder = self.encoder_mut()?;

        encoder.write(
            &ActivityMessage::new(global::FILE_ID)
                .with(0, FieldValue::Enum(FILE_TYPE_ACTIVITY))
                .with(1, identity.manufacturer as i64)
                .with(2, identity.product as i64)
                .with(3, identity.serial_number as i64)
                .with(4, started_at),
        )?;
        encoder.write(&timer_event(started_at, EVENT_TYPE_START))?;

        info!("Recording started");
        self.started_at = Some(started_at);
        Ok(())
    }

    /// Write one record message.
    pub fn record(&mut self, sample: &RecordSample) -> Result<()> {
        let started_at = self.started_at.ok_or(TelemetryError::NotStarted { what: "activity recording" })?;

        let (latitude, longitude) = match sample.position {
            Some(position) => (FieldValue::Float(position.latitude), FieldValue::Float(position.longitude)),
            None => (FieldValue::SInt32(INVALID_SINT32), FieldValue::SInt32(INVALID_SINT32)),
        };
        let speed = sample.speed_mps.max(0.0);
        let distance = sample.distance_m.max(0.0);

        self.encoder_mut()?.write(
            &ActivityMessage::new(global::RECORD)
                .with(253, sample.timestamp)
                .with(0, latitude)
                .with(1, longitude)
                .with(5, centimetres(distance))
                .with(6, millimetres_per_second(speed)),
        )?;

        let summary = &mut self.summary;
        summary.records += 1;
        summary.elapsed = sample.timestamp.duration_since(started_at).unwrap_or(summary.elapsed);
        summary.distance_m = summary.distance_m.max(distance);
        summary.max_speed_mps = summary.max_speed_mps.max(speed);
        trace!(records = summary.records, distance_m = summary.distance_m, "Recorded sample");
        Ok(())
    }

    /// Write the closing messages and finish the file.
    pub fn finish(&mut self, ended_at: SystemTime) -> Result<FinishedFile> {
        self.finish_into_inner(ended_at).map(|(_, finished)| finished)
    }

    /// Like [`finish`](Self::finish), returning the sink as well.
    pub fn finish_into_inner(&mut self, ended_at: SystemTime) -> Result<(W, FinishedFile)> {
        let started_at = self.started_at.ok_or(TelemetryError::NotStarted { what: "activity recording" })?;
        let summary = self.summary;
        let elapsed = ended_at.duration_since(started_at).unwrap_or(summary.elapsed);
        let elapsed_ms = elapsed.as_millis().min(u32::MAX as u128) as i64;
        let distance = centimetres(summary.distance_m);
        let avg_speed = millimetres_per_second(summary.avg_speed_mps());
        let max_speed = millimetres_per_second(summary.max_speed_mps);

        let encoder = self.encoder_mut()?;
        encoder.write(&timer_event(ended_at, EVENT_TYPE_STOP_ALL))?;
        encoder.write(
            &ActivityMessage::new(global::LAP)
                .with(253, ended_at)
                .with(254, 0i64)
                .with(0, FieldValue::Enum(EVENT_LAP))
                .with(1, FieldValue::Enum(EVENT_TYPE_STOP))
                .with(2, started_at)
                .with(7, elapsed_ms)
                .with(8, elapsed_ms)
                .with(9, distance)
                .with(13, avg_speed)
                .with(14, max_speed),
        )?;
        encoder.write(
            &ActivityMessage::new(global::SESSION)
                .with(253, ended_at)
                .with(254, 0i64)
                .with(0, FieldValue::Enum(EVENT_SESSION))
                .with(1, FieldValue::Enum(EVENT_TYPE_STOP))
                .with(2, started_at)
                .with(5, FieldValue::Enum(SPORT_CYCLING))
                .with(6, FieldValue::Enum(SUB_SPORT_GENERIC))
                .with(7, elapsed_ms)
                .with(8, elapsed_ms)
                .with(9, distance)
                .with(14, avg_speed)
                .with(15, max_speed)
                .with(25, 0i64)
                .with(26, 1i64)
                .with(28, FieldValue::Enum(SESSION_TRIGGER_ACTIVITY_END)),
        )?;
        encoder.write(
            &ActivityMessage::new(global::ACTIVITY)
                .with(253, ended_at)
                .with(0, elapsed_ms)
                .with(1, 1i64)
                .with(2, FieldValue::Enum(ACTIVITY_TYPE_MANUAL))
                .with(3, FieldValue::Enum(EVENT_ACTIVITY))
                .with(4, FieldValue::Enum(EVENT_TYPE_STOP))
                .with(5, ended_at),
        )?;

        let encoder = self.encoder.take().ok_or(TelemetryError::Finished { what: "activity recording" })?;
        let (sink, finished) = encoder.finish_into_inner()?;
        debug!(records = summary.records, distance_m = summary.distance_m, "Closing messages written");
        info!(len = finished.len, "Recording finished");
        Ok((sink, finished))
    }

    fn encoder_mut(&mut self) -> Result<&mut ActivityFileEncoder<W>> {
        self.encoder.as_mut().ok_or(TelemetryError::Finished { what: "activity recording" })
    }
}

fn timer_event(at: SystemTime, event_type: u8) -> ActivityMessage {
    ActivityMessage::new(global::EVENT)
        .with(253, at)
        .with(0, FieldValue::Enum(EVENT_TIMER))
        .with(1, FieldValue::Enum(event_type))
}

fn centimetres(metres: f64) -> i64 {
    (metres * 100.0).round().min(u32::MAX as f64) as i64
}

// uint16 with 0xFFFF reserved as invalid
fn millimetres_per_second(mps: f64) -> i64 {
    (mps * 1000.0).round().min(65_534.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{ActivityFileReader, ChecksumKind, DecodedValue};
    use crate::fit::format::system_time_from_fit;

    fn at(seconds: u32) -> SystemTime {
        system_time_from_fit(1_000_000_000 + seconds)
    }

    fn sample(seconds: u32, speed_mps: f64, distance_m: f64, position: Option<GeoPosition>) -> RecordSample {
        RecordSample { timestamp: at(seconds), speed_mps, distance_m, position }
    }

    #[test]
    fn writes_the_full_message_sequence() {
        let mut recorder = ActivityRecorder::new(Vec::new(), DeviceIdentity::default(), &RunConfig::default());
        recorder.start(at(0)).unwrap();
        recorder.record(&sample(1, 0.0, 0.0, None)).unwrap();
        recorder.record(&sample(2, 8.5, 8.5, Some(GeoPosition::new(52.37, 4.89)))).unwrap();
        recorder.record(&sample(3, 9.0, 17.5, Some(GeoPosition::new(52.3701, 4.8901)))).unwrap();
        let (bytes, finished) = recorder.finish_into_inner(at(4)).unwrap();

        assert_eq!(finished.definitions, 6);
        assert_eq!(finished.records, 2 + 3 + 4);

        let reader = ActivityFileReader::from_bytes(&bytes, ChecksumKind::Ccitt).unwrap();
        let order: Vec<u16> = reader.messages().iter().map(|m| m.global_id).collect();
        assert_eq!(order, vec![0, 21, 20, 20, 20, 21, 19, 18, 34]);

        let records: Vec<_> = reader.messages_of(global::RECORD).collect();
        assert_eq!(records[0].field(0), Some(&DecodedValue::SInt(INVALID_SINT32 as i64)));
        let latitude = records[1].field(0).and_then(DecodedValue::as_degrees).unwrap();
        assert!((latitude - 52.37).abs() < 1e-6);
        assert_eq!(records[2].field(5), Some(&DecodedValue::UInt(1_750)));
        assert_eq!(records[2].field(6), Some(&DecodedValue::UInt(9_000)));

        let session = reader.messages_of(global::SESSION).next().unwrap();
        assert_eq!(session.field(5), Some(&DecodedValue::UInt(SPORT_CYCLING as u64)));
        assert_eq!(session.field(7), Some(&DecodedValue::UInt(4_000)));
        assert_eq!(session.field(15), Some(&DecodedValue::UInt(9_000)));
    }

    #[test]
    fn summary_tracks_totals() {
        let mut recorder = ActivityRecorder::new(Vec::new(), DeviceIdentity::default(), &RunConfig::default());
        recorder.start(at(0)).unwrap();
        recorder.record(&sample(5, 10.0, 50.0, None)).unwrap();
        recorder.record(&sample(10, 6.0, 100.0, None)).unwrap();

        let summary = recorder.summary();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.elapsed, Duration::from_secs(10));
        assert_eq!(summary.distance_m, 100.0);
        assert_eq!(summary.max_speed_mps, 10.0);
        assert_eq!(summary.avg_speed_mps(), 10.0);
    }

    #[test]
    fn lifecycle_errors() {
        let mut recorder = ActivityRecorder::new(Vec::new(), DeviceIdentity::default(), &RunConfig::default());
        let err = recorder.record(&sample(1, 1.0, 1.0, None)).unwrap_err();
        assert!(matches!(err, TelemetryError::NotStarted { .. }));

        recorder.start(at(0)).unwrap();
        assert!(matches!(recorder.start(at(1)), Err(TelemetryError::AlreadyStarted { .. })));
        recorder.finish(at(2)).unwrap();

        let err = recorder.record(&sample(3, 1.0, 1.0, None)).unwrap_err();
        assert!(matches!(err, TelemetryError::Finished { .. }));
        assert!(matches!(recorder.finish(at(4)), Err(TelemetryError::Finished { .. })));
    }

    #[test]
    fn sample_from_reading() {
        let mut reading = SpeedReading::idle(std::time::Instant::now());
        reading.speed_kmh = 36.0;
        reading.distance_m = 120.0;
        let sample = RecordSample::from_reading(&reading, at(7));
        assert!((sample.speed_mps - 10.0).abs() < 1e-12);
        assert_eq!(sample.distance_m, 120.0);
        assert_eq!(sample.timestamp, at(7));
    }
}
