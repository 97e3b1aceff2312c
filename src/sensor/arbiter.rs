//! Speed source arbitration
//!
//! The arbiter owns the latest value from each producer and derives the published
//! reading from those two scalars on every event. It never sees a half-applied
//! update: each call mutates one producer's slot and then recomputes from scratch.
//!
//! Policy:
//! - wheel sensor active (data since last disconnect) ⇒ wheel speed is authoritative,
//!   otherwise location speed
//! - published speed below the publish floor is exactly 0
//! - no revolution for the watchdog timeout while active ⇒ wheel speed forced to 0
//! - disconnect clears activity, decoder baseline and lap revolution baseline; the
//!   distance covered so far is carried and re-based on the next sample

use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::decoder::{DecodeOutcome, WheelRevolutionDecoder};
use super::location::LocationSpeedFilter;
use crate::RunConfig;
use crate::types::{
    GeoPosition, LocationSample, RunDistanceState, SpeedReading, SpeedSource,
    WheelTelemetrySample,
};

/// Merges wheel-sensor and location speed into one published reading.
#[derive(Debug, Clone)]
pub struct SpeedSourceArbiter {
    decoder: WheelRevolutionDecoder,
    filter: LocationSpeedFilter,
    publish_floor_kmh: f64,
    watchdog_timeout: Duration,
    bluetooth_active: bool,
    location_speed_kmh: f64,
    position: Option<GeoPosition>,
    distance: RunDistanceState,
    published: SpeedReading,
}

impl SpeedSourceArbiter {
    /// Create an arbiter for a new run. The lap starts at the first wheel sample.
    pub fn new(config: &RunConfig, now: Instant) -> Self {
        Self {
            decoder: WheelRevolutionDecoder::new(config.wheel_circumference_m),
            filter: LocationSpeedFilter::new(config.location_floor_kmh),
            publish_floor_kmh: config.publish_floor_kmh,
            watchdog_timeout: config.watchdog_timeout(),
            bluetooth_active: false,
            location_speed_kmh: 0.0,
            position: None,
            distance: RunDistanceState::default(),
            published: SpeedReading::idle(now),
        }
    }

    /// Apply one wheel sample.
    pub fn on_wheel_sample(&mut self, sample: WheelTelemetrySample, now: Instant) -> SpeedReading {
        if !self.bluetooth_active {
            info!("Wheel sensor active, switching to Bluetooth speed");
            self.bluetooth_active = true;
        }

        let outcome = self.decoder.ingest(sample, now);
        if outcome != DecodeOutcome::Duplicate && self.distance.lap_baseline_revolutions.is_none() {
            debug!("Lap baseline set at {} revolutions", sample.cumulative_revolutions);
            self.distance.lap_baseline_revolutions = Some(sample.cumulative_revolutions);
        }

        self.recompute(now)
    }

    /// Apply one location update.
    pub fn on_location(&mut self, sample: LocationSample, now: Instant) -> SpeedReading {
        self.location_speed_kmh = self.filter.filter(&sample);
        if sample.position.is_some() {
            self.position = sample.position;
        }
        self.recompute(now)
    }

    /// Periodic evaluation so the watchdog fires without new samples.
    pub fn on_tick(&mut self, now: Instant) -> SpeedReading {
        self.recompute(now)
    }

    /// Wheel sensor went away; fall back to location speed.
    pub fn on_disconnect(&mut self, now: Instant) -> SpeedReading {
        info!("Wheel sensor disconnected, falling back to location speed");
        self.distance.accumulated_meters = self.distance_m();
        self.distance.lap_baseline_revolutions = None;
        self.decoder.reset();
        self.bluetooth_active = false;
        self.recompute(now)
    }

    /// Start a new lap at the current cumulative revolution count.
    pub fn reset_lap(&mut self, now: Instant) -> SpeedReading {
        self.distance = RunDistanceState {
            lap_baseline_revolutions: self.decoder.previous().map(|s| s.cumulative_revolutions),
            accumulated_meters: 0.0,
        };
        debug!("Lap reset, baseline {:?}", self.distance.lap_baseline_revolutions);
        self.recompute(now)
    }

    /// Distance since the lap started, in metres.
    pub fn distance_m(&self) -> f64 {
        let segment = match (self.distance.lap_baseline_revolutions, self.decoder.previous()) {
            (Some(baseline), Some(current)) => {
                self.decoder.distance_between(baseline, current.cumulative_revolutions)
            }
            _ => 0.0,
        };
        self.distance.accumulated_meters + segment
    }

    /// Last published reading.
    pub fn reading(&self) -> SpeedReading {
        self.published
    }

    pub fn is_bluetooth_active(&self) -> bool {
        self.bluetooth_active
    }

    pub fn distance_state(&self) -> RunDistanceState {
        self.distance
    }

    fn apply_watchdog(&mut self, now: Instant) {
        if !self.bluetooth_active || self.decoder.speed_kmh() == 0.0 {
            return;
        }
        if let Some(last) = self.decoder.last_movement() {
            if now.saturating_duration_since(last) >= self.watchdog_timeout {
                debug!("No wheel movement for {:?}, forcing speed to zero", self.watchdog_timeout);
                self.decoder.clear_speed();
            }
        }
    }

    fn recompute(&mut self, now: Instant) -> SpeedReading {
        self.apply_watchdog(now);

        let (raw, source) = if self.bluetooth_active {
            (self.decoder.speed_kmh(), SpeedSource::Bluetooth)
        } else {
            (self.location_speed_kmh, SpeedSource::Location)
        };
        let speed_kmh = if raw < self.publish_floor_kmh { 0.0 } else { raw };

        self.published = SpeedReading {
            speed_kmh,
            distance_m: self.distance_m(),
            source,
            bluetooth_active: self.bluetooth_active,
            position: self.position,
            observed_at: now,
        };
        self.published
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter(t0: Instant) -> SpeedSourceArbiter {
        SpeedSourceArbiter::new(&RunConfig::with_circumference(2.1), t0)
    }

    fn moving(arb: &mut SpeedSourceArbiter, t0: Instant) {
        arb.on_wheel_sample(WheelTelemetrySample::new(0, 0), t0);
        arb.on_wheel_sample(WheelTelemetrySample::new(10, 512), t0);
    }

    #[test]
    fn location_is_used_until_wheel_data_arrives() {
        let t0 = Instant::now();
        let mut arb = arbiter(t0);
        let reading = arb.on_location(LocationSample::new(5.0, None), t0);
        assert_eq!(reading.source, SpeedSource::Location);
        assert!((reading.speed_kmh - 18.0).abs() < 1e-9);
    }

    #[test]
    fn wheel_wins_once_active() {
        let t0 = Instant::now();
        let mut arb = arbiter(t0);
        moving(&mut arb, t0);
        let reading = arb.on_location(LocationSample::new(20.0, None), t0);
        assert_eq!(reading.source, SpeedSource::Bluetooth);
        assert!((reading.speed_kmh - 151.2).abs() < 1e-9);
        assert!((reading.distance_m - 21.0).abs() < 1e-9);
    }

    #[test]
    fn baseline_sample_activates_wheel_with_zero_speed() {
        let t0 = Instant::now();
        let mut arb = arbiter(t0);
        arb.on_location(LocationSample::new(8.0, None), t0);
        let reading = arb.on_wheel_sample(WheelTelemetrySample::new(77, 9), t0);
        assert!(reading.bluetooth_active);
        assert_eq!(reading.speed_kmh, 0.0);
        assert_eq!(reading.distance_m, 0.0);
    }

    #[test]
    fn watchdog_zeroes_speed_after_timeout() {
        let t0 = Instant::now();
        let mut arb = arbiter(t0);
        moving(&mut arb, t0);
        assert!(arb.on_tick(t0 + Duration::from_secs(14)).speed_kmh > 0.0);
        assert_eq!(arb.on_tick(t0 + Duration::from_secs(15)).speed_kmh, 0.0);
        // a stationary sample afterwards keeps it at zero
        let reading =
            arb.on_wheel_sample(WheelTelemetrySample::new(10, 2000), t0 + Duration::from_secs(16));
        assert_eq!(reading.speed_kmh, 0.0);
        assert_eq!(reading.source, SpeedSource::Bluetooth);
    }

    #[test]
    fn stationary_samples_do_not_postpone_watchdog() {
        let t0 = Instant::now();
        let mut arb = arbiter(t0);
        moving(&mut arb, t0);
        for secs in 1..15 {
            let sample = WheelTelemetrySample::new(10, 512 + secs as u16 * 1024);
            arb.on_wheel_sample(sample, t0 + Duration::from_secs(secs));
        }
        let reading =
            arb.on_wheel_sample(WheelTelemetrySample::new(10, 20_000), t0 + Duration::from_secs(15));
        assert_eq!(reading.speed_kmh, 0.0);
    }

    #[test]
    fn publish_floor_is_exact_zero() {
        let t0 = Instant::now();
        let mut config = RunConfig::with_circumference(0.001);
        config.location_floor_kmh = 0.0;
        let mut arb = SpeedSourceArbiter::new(&config, t0);
        let reading = arb.on_location(LocationSample::new(0.02, None), t0);
        assert_eq!(reading.speed_kmh, 0.0);
        arb.on_wheel_sample(WheelTelemetrySample::new(0, 0), t0);
        // 1 mm over 1 s = 0.0036 km/h
        let reading = arb.on_wheel_sample(WheelTelemetrySample::new(1, 1024), t0);
        assert_eq!(reading.speed_kmh, 0.0);
    }

    #[test]
    fn disconnect_falls_back_and_keeps_distance() {
        let t0 = Instant::now();
        let mut arb = arbiter(t0);
        moving(&mut arb, t0);
        arb.on_location(LocationSample::new(10.0, None), t0);

        let reading = arb.on_disconnect(t0);
        assert!(!reading.bluetooth_active);
        assert_eq!(reading.source, SpeedSource::Location);
        assert!((reading.speed_kmh - 36.0).abs() < 1e-9);
        assert!((reading.distance_m - 21.0).abs() < 1e-9);
        assert_eq!(arb.distance_state().lap_baseline_revolutions, None);

        // reconnect with a counter from a power-cycled sensor
        arb.on_wheel_sample(WheelTelemetrySample::new(500, 100), t0);
        let reading = arb.on_wheel_sample(WheelTelemetrySample::new(505, 612), t0);
        assert!((reading.distance_m - (21.0 + 5.0 * 2.1)).abs() < 1e-9);
    }

    #[test]
    fn reset_lap_rebases_to_current_count() {
        let t0 = Instant::now();
        let mut arb = arbiter(t0);
        moving(&mut arb, t0);
        assert_eq!(arb.reset_lap(t0).distance_m, 0.0);
        let reading = arb.on_wheel_sample(WheelTelemetrySample::new(12, 1024), t0);
        assert!((reading.distance_m - 4.2).abs() < 1e-9);
    }

    #[test]
    fn reset_lap_before_any_sample_waits_for_first_sample() {
        let t0 = Instant::now();
        let mut arb = arbiter(t0);
        arb.reset_lap(t0);
        assert_eq!(arb.distance_state().lap_baseline_revolutions, None);
        arb.on_wheel_sample(WheelTelemetrySample::new(4_294_967_290, 0), t0);
        let reading = arb.on_wheel_sample(WheelTelemetrySample::new(5, 1024), t0);
        assert!((reading.distance_m - 11.0 * 2.1).abs() < 1e-9);
    }

    #[test]
    fn location_never_surfaces_while_active() {
        let t0 = Instant::now();
        let mut arb = arbiter(t0);
        arb.on_wheel_sample(WheelTelemetrySample::new(1, 1), t0);
        for speed in [0.0, 3.0, 12.0, 40.0] {
            let reading = arb.on_location(LocationSample::new(speed, None), t0);
            assert_eq!(reading.source, SpeedSource::Bluetooth);
            assert_eq!(reading.speed_kmh, 0.0);
        }
    }

    #[test]
    fn position_is_carried_from_last_fix() {
        let t0 = Instant::now();
        let mut arb = arbiter(t0);
        let fix = GeoPosition::new(44.65, -63.57);
        arb.on_location(LocationSample::new(4.0, Some(fix)), t0);
        let reading = arb.on_location(LocationSample::new(4.0, None), t0);
        assert_eq!(reading.position, Some(fix));
    }
}
