//! Location speed dead-band

use crate::types::LocationSample;

/// Dead-bands location-provider speed so a stationary GPS fix does not read as motion.
#[derive(Debug, Clone, Copy)]
pub struct LocationSpeedFilter {
    floor_kmh: f64,
}

impl LocationSpeedFilter {
    pub fn new(floor_kmh: f64) -> Self {
        Self { floor_kmh }
    }

    /// Speed in km/h, or exactly 0.0 below the floor or when the platform reports
    /// an unknown (negative or non-finite) speed.
    pub fn filter(&self, sample: &LocationSample) -> f64 {
        if !sample.speed_mps.is_finite() || sample.speed_mps <= 0.0 {
            return 0.0;
        }
        let kmh = sample.speed_mps * 3.6;
        if kmh < self.floor_kmh { 0.0 } else { kmh }
    }

    pub fn floor_kmh(&self) -> f64 {
        self.floor_kmh
    }
}

impl Default for LocationSpeedFilter {
    fn default() -> Self {
        Self::new(3.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(speed_mps: f64) -> LocationSample {
        LocationSample::new(speed_mps, None)
    }

    #[test]
    fn floors_stationary_jitter() {
        let filter = LocationSpeedFilter::default();
        // 0.8 m/s = 2.88 km/h
        assert_eq!(filter.filter(&sample(0.8)), 0.0);
        assert!((filter.filter(&sample(10.0)) - 36.0).abs() < 1e-9);
    }

    #[test]
    fn floor_is_inclusive_of_threshold() {
        let filter = LocationSpeedFilter::new(3.6);
        assert!((filter.filter(&sample(1.0)) - 3.6).abs() < 1e-9);
    }

    #[test]
    fn unknown_speed_reads_as_zero() {
        let filter = LocationSpeedFilter::default();
        assert_eq!(filter.filter(&sample(-1.0)), 0.0);
        assert_eq!(filter.filter(&sample(f64::NAN)), 0.0);
        assert_eq!(filter.filter(&sample(f64::INFINITY)), 0.0);
    }
}
