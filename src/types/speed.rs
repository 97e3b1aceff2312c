//! Speed estimates and the published speed/distance reading

use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::GeoPosition;

/// Where an authoritative speed value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeedSource {
    /// Wheel-revolution sensor over Bluetooth LE
    Bluetooth,
    /// Platform location provider
    Location,
}

/// A single speed value together with its origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedEstimate {
    pub value_kmh: f64,
    pub source: SpeedSource,
    pub observed_at: Instant,
}

/// Lap distance bookkeeping.
///
/// `lap_baseline_revolutions` is the cumulative revolution count the lap is measured
/// from. `accumulated_meters` holds distance carried across sensor reconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunDistanceState {
    pub lap_baseline_revolutions: Option<u32>,
    pub accumulated_meters: f64,
}

/// The value the speed sensor service publishes after every event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedReading {
    /// Authoritative speed in km/h (exactly 0.0 below the publish floor)
    pub speed_kmh: f64,
    /// Distance since the last lap reset in metres
    pub distance_m: f64,
    /// Source of `speed_kmh`
    pub source: SpeedSource,
    /// Whether the wheel sensor has delivered data since its last disconnect
    pub bluetooth_active: bool,
    /// Last location fix seen, if any
    pub position: Option<GeoPosition>,
    /// When this reading was computed
    pub observed_at: Instant,
}

impl SpeedReading {
    /// Reading published before any producer has delivered data.
    pub fn idle(observed_at: Instant) -> Self {
        Self {
            speed_kmh: 0.0,
            distance_m: 0.0,
            source: SpeedSource::Location,
            bluetooth_active: false,
            position: None,
            observed_at,
        }
    }

    /// The speed part of this reading.
    pub fn estimate(&self) -> SpeedEstimate {
        SpeedEstimate { value_kmh: self.speed_kmh, source: self.source, observed_at: self.observed_at }
    }

    /// Speed in m/s.
    pub fn speed_mps(&self) -> f64 {
        self.speed_kmh / 3.6
    }
}
