//! Core types for speed telemetry.
//!
//! - [`WheelTelemetrySample`] is one cumulative-revolution reading from the wheel sensor,
//!   with wraparound-safe delta helpers
//! - [`LocationSample`] is one update from the platform location provider
//! - [`SpeedReading`] is what the speed sensor service publishes after every event
//! - [`UpdateRate`] controls how often subscribers see readings
//!
//! ## Usage Example
//!
//! ```rust
//! use tirelab::types::WheelTelemetrySample;
//!
//! let previous = WheelTelemetrySample::new(4_294_967_290, 65_000);
//! let current = WheelTelemetrySample::new(5, 464);
//!
//! assert_eq!(current.revolutions_since(&previous), 11);
//! assert_eq!(current.ticks_since(&previous), 1_000);
//! ```

mod location;
mod speed;
mod update_rate;
mod wheel;

pub use location::{GeoPosition, LocationSample};
pub use speed::{RunDistanceState, SpeedEstimate, SpeedReading, SpeedSource};
pub use update_rate::UpdateRate;
pub use wheel::{
    EVENT_TIME_TICKS_PER_SECOND, WheelTelemetrySample, event_time_delta, revolution_delta,
};
