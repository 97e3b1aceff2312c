//! Location provider samples

use serde::{Deserialize, Serialize};

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPosition {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// One periodic update from the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Ground speed in m/s as reported by the platform; negative means unknown
    pub speed_mps: f64,
    /// Position fix, if the platform supplied one
    pub position: Option<GeoPosition>,
}

impl LocationSample {
    pub fn new(speed_mps: f64, position: Option<GeoPosition>) -> Self {
        Self { speed_mps, position }
    }
}
