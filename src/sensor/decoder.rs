//! Wheel-revolution decoding
//!
//! Turns the cumulative counters reported by a cycling speed sensor into speed and
//! lap distance. Both counters wrap (revolutions at 2^32, event time at 2^16), so
//! every delta is taken modulo the counter width.
//!
//! ## Notification layout
//!
//! ```text
//! offset 0   flags        bit 0 = wheel revolution data present
//! offset 1   u32 LE       cumulative wheel revolutions
//! offset 5   u16 LE       last wheel event time (1/1024 s)
//! ```

use std::time::Instant;
use tracing::trace;

use crate::types::{EVENT_TIME_TICKS_PER_SECOND, WheelTelemetrySample};
use crate::{Result, TelemetryError};

/// Flags bit announcing a wheel-revolution payload.
pub const WHEEL_REVOLUTION_PRESENT: u8 = 0x01;

/// Bytes needed for flags + wheel payload.
const WHEEL_FRAME_LEN: usize = 7;

/// Parse a raw measurement notification.
///
/// Returns `Ok(None)` for frames without wheel data and a `Frame` error for frames
/// that are empty or claim wheel data but are too short to carry it.
pub fn parse_notification(frame: &[u8]) -> Result<Option<WheelTelemetrySample>> {
    let Some(&flags) = frame.first() else {
        return Err(TelemetryError::frame_error("empty notification", 0));
    };

    if flags & WHEEL_REVOLUTION_PRESENT == 0 {
        return Ok(None);
    }

    if frame.len() < WHEEL_FRAME_LEN {
        return Err(TelemetryError::frame_error(
            format!("wheel payload needs {} bytes", WHEEL_FRAME_LEN),
            frame.len(),
        ));
    }

    let revolutions = u32::from_le_bytes([frame[1], frame[2], frame[3], frame[4]]);
    let event_time = u16::from_le_bytes([frame[5], frame[6]]);
    Ok(Some(WheelTelemetrySample::new(revolutions, event_time)))
}

/// What a single sample did to the decoder state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeOutcome {
    /// First sample since connect/reset; only the baseline was stored
    Baseline,
    /// Bit-identical repeat of the previous sample; nothing changed
    Duplicate,
    /// Wheel moved; new speed computed
    Moving { speed_kmh: f64, revolutions: u32 },
    /// No new revolutions; previous speed retained
    Stationary,
    /// Revolutions advanced but the event clock did not; speed retained
    ClockStalled,
}

/// Decoder for cumulative wheel-revolution telemetry.
#[derive(Debug, Clone)]
pub struct WheelRevolutionDecoder {
    circumference_m: f64,
    previous: Option<WheelTelemetrySample>,
    speed_kmh: f64,
    last_movement: Option<Instant>,
}

impl WheelRevolutionDecoder {
    pub fn new(circumference_m: f64) -> Self {
        Self { circumference_m, previous: None, speed_kmh: 0.0, last_movement: None }
    }

    /// Ingest one sample observed at `now`.
    pub fn ingest(&mut self, sample: WheelTelemetrySample, now: Instant) -> DecodeOutcome {
        let Some(previous) = self.previous else {
            trace!(
                "Wheel baseline: revs={}, time={}",
                sample.cumulative_revolutions, sample.event_time
            );
            self.previous = Some(sample);
            return DecodeOutcome::Baseline;
        };

        if previous == sample {
            return DecodeOutcome::Duplicate;
        }

        let revolutions = sample.revolutions_since(&previous);
        let ticks = sample.ticks_since(&previous);
        self.previous = Some(sample);

        if revolutions == 0 {
            return DecodeOutcome::Stationary;
        }
        if ticks == 0 {
            return DecodeOutcome::ClockStalled;
        }

        let distance_m = revolutions as f64 * self.circumference_m;
        let seconds = ticks as f64 / EVENT_TIME_TICKS_PER_SECOND;
        self.speed_kmh = distance_m / seconds * 3.6;
        self.last_movement = Some(now);

        trace!("Wheel moved: revs={}, ticks={}, speed={:.2} km/h", revolutions, ticks, self.speed_kmh);
        DecodeOutcome::Moving { speed_kmh: self.speed_kmh, revolutions }
    }

    /// Forget the previous sample and speed. Used on disconnect.
    pub fn reset(&mut self) {
        self.previous = None;
        self.speed_kmh = 0.0;
        self.last_movement = None;
    }

    /// Force the held speed to zero without dropping the baseline.
    pub fn clear_speed(&mut self) {
        self.speed_kmh = 0.0;
    }

    /// Last computed speed in km/h.
    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    /// When the last nonzero revolution delta was seen.
    pub fn last_movement(&self) -> Option<Instant> {
        self.last_movement
    }

    /// Most recent sample accepted.
    pub fn previous(&self) -> Option<WheelTelemetrySample> {
        self.previous
    }

    pub fn circumference_m(&self) -> f64 {
        self.circumference_m
    }

    /// Metres covered between `baseline` and `current` revolution counts.
    pub fn distance_between(&self, baseline: u32, current: u32) -> f64 {
        crate::types::revolution_delta(current, baseline) as f64 * self.circumference_m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn frame(revs: u32, time: u16) -> Vec<u8> {
        let mut bytes = vec![WHEEL_REVOLUTION_PRESENT];
        bytes.extend_from_slice(&revs.to_le_bytes());
        bytes.extend_from_slice(&time.to_le_bytes());
        bytes
    }

    #[test]
    fn parses_wheel_payload() {
        let sample = parse_notification(&frame(0x0102_0304, 0x0506)).unwrap().unwrap();
        assert_eq!(sample.cumulative_revolutions, 0x0102_0304);
        assert_eq!(sample.event_time, 0x0506);
    }

    #[test]
    fn ignores_frames_without_wheel_flag() {
        // crank-only measurement: flags bit 1, crank revs u16, crank time u16
        assert_eq!(parse_notification(&[0x02, 1, 0, 2, 0]).unwrap(), None);
    }

    #[test]
    fn rejects_short_and_empty_frames() {
        let err = parse_notification(&[0x01, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, TelemetryError::Frame { len: 4, .. }));
        assert!(matches!(parse_notification(&[]), Err(TelemetryError::Frame { len: 0, .. })));
    }

    #[test]
    fn trailing_crank_data_is_ignored() {
        let mut bytes = frame(42, 1024);
        bytes[0] |= 0x02;
        bytes.extend_from_slice(&[7, 0, 0, 4]);
        let sample = parse_notification(&bytes).unwrap().unwrap();
        assert_eq!(sample, WheelTelemetrySample::new(42, 1024));
    }

    #[test]
    fn first_sample_is_baseline_only() {
        let mut decoder = WheelRevolutionDecoder::new(2.1);
        let outcome = decoder.ingest(WheelTelemetrySample::new(100, 0), Instant::now());
        assert_eq!(outcome, DecodeOutcome::Baseline);
        assert_eq!(decoder.speed_kmh(), 0.0);
        assert!(decoder.last_movement().is_none());
    }

    #[test]
    fn computes_reference_speed() {
        let mut decoder = WheelRevolutionDecoder::new(2.1);
        let t0 = Instant::now();
        decoder.ingest(WheelTelemetrySample::new(0, 0), t0);
        let outcome = decoder.ingest(WheelTelemetrySample::new(10, 512), t0);
        match outcome {
            DecodeOutcome::Moving { speed_kmh, revolutions } => {
                assert_eq!(revolutions, 10);
                assert!((speed_kmh - 151.2).abs() < 1e-9, "speed was {speed_kmh}");
            }
            other => panic!("expected movement, got {other:?}"),
        }
        assert!((decoder.distance_between(0, 10) - 21.0).abs() < 1e-9);
    }

    #[test]
    fn speed_across_both_wraparounds() {
        let mut decoder = WheelRevolutionDecoder::new(2.0);
        let now = Instant::now();
        decoder.ingest(WheelTelemetrySample::new(4_294_967_290, 65_000), now);
        let outcome = decoder.ingest(WheelTelemetrySample::new(5, 1_000 - 536), now);
        // 11 revs * 2 m over 1000 ticks
        let expected = 22.0 / (1000.0 / 1024.0) * 3.6;
        assert_eq!(outcome, DecodeOutcome::Moving { speed_kmh: expected, revolutions: 11 });
    }

    #[test]
    fn duplicate_is_a_no_op() {
        let mut decoder = WheelRevolutionDecoder::new(2.1);
        let t0 = Instant::now();
        decoder.ingest(WheelTelemetrySample::new(0, 0), t0);
        decoder.ingest(WheelTelemetrySample::new(4, 1024), t0);
        let speed = decoder.speed_kmh();
        let later = t0 + Duration::from_secs(3);
        assert_eq!(decoder.ingest(WheelTelemetrySample::new(4, 1024), later), DecodeOutcome::Duplicate);
        assert_eq!(decoder.speed_kmh(), speed);
        assert_eq!(decoder.last_movement(), Some(t0));
    }

    #[test]
    fn zero_revolutions_retain_speed() {
        let mut decoder = WheelRevolutionDecoder::new(2.1);
        let t0 = Instant::now();
        decoder.ingest(WheelTelemetrySample::new(0, 0), t0);
        decoder.ingest(WheelTelemetrySample::new(4, 1024), t0);
        let speed = decoder.speed_kmh();
        assert_eq!(decoder.ingest(WheelTelemetrySample::new(4, 2048), t0), DecodeOutcome::Stationary);
        assert_eq!(decoder.speed_kmh(), speed);
    }

    #[test]
    fn stalled_clock_keeps_speed_and_advances_baseline() {
        let mut decoder = WheelRevolutionDecoder::new(2.1);
        let t0 = Instant::now();
        decoder.ingest(WheelTelemetrySample::new(0, 0), t0);
        assert_eq!(decoder.ingest(WheelTelemetrySample::new(3, 0), t0), DecodeOutcome::ClockStalled);
        assert_eq!(decoder.previous(), Some(WheelTelemetrySample::new(3, 0)));
    }

    #[test]
    fn reset_requires_new_baseline() {
        let mut decoder = WheelRevolutionDecoder::new(2.1);
        let t0 = Instant::now();
        decoder.ingest(WheelTelemetrySample::new(0, 0), t0);
        decoder.ingest(WheelTelemetrySample::new(4, 1024), t0);
        decoder.reset();
        assert_eq!(decoder.speed_kmh(), 0.0);
        assert_eq!(decoder.ingest(WheelTelemetrySample::new(9, 3000), t0), DecodeOutcome::Baseline);
    }

    proptest! {
        #[test]
        fn prop_repeated_sample_never_changes_speed(
            revs in any::<u32>(), time in any::<u16>(), step in 1u32..50, ticks in 1u16..4096
        ) {
            let mut decoder = WheelRevolutionDecoder::new(2.1);
            let now = Instant::now();
            decoder.ingest(WheelTelemetrySample::new(revs, time), now);
            let moving = WheelTelemetrySample::new(revs.wrapping_add(step), time.wrapping_add(ticks));
            decoder.ingest(moving, now);
            let speed = decoder.speed_kmh();
            for _ in 0..3 {
                prop_assert_eq!(decoder.ingest(moving, now), DecodeOutcome::Duplicate);
                prop_assert_eq!(decoder.speed_kmh(), speed);
            }
        }
    }
}
