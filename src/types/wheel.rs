//! Wheel-revolution sensor samples and wraparound-safe counter arithmetic

use serde::{Deserialize, Serialize};

/// Sensor event-time ticks per second (the event time counts 1/1024 s).
pub const EVENT_TIME_TICKS_PER_SECOND: f64 = 1024.0;

/// One cumulative wheel-revolution reading from a speed sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WheelTelemetrySample {
    /// Cumulative wheel revolutions, wraps at 2^32
    pub cumulative_revolutions: u32,
    /// Time of the last wheel event in 1/1024 s, wraps at 2^16
    pub event_time: u16,
}

impl WheelTelemetrySample {
    /// Create a new sample.
    pub const fn new(cumulative_revolutions: u32, event_time: u16) -> Self {
        Self { cumulative_revolutions, event_time }
    }

    /// Revolutions elapsed since `previous`, modulo 2^32.
    pub fn revolutions_since(&self, previous: &Self) -> u32 {
        revolution_delta(self.cumulative_revolutions, previous.cumulative_revolutions)
    }

    /// Event-time ticks elapsed since `previous`, modulo 2^16.
    pub fn ticks_since(&self, previous: &Self) -> u16 {
        event_time_delta(self.event_time, previous.event_time)
    }
}

/// `(current - previous) mod 2^32`.
pub fn revolution_delta(current: u32, previous: u32) -> u32 {
    current.wrapping_sub(previous)
}

/// `(current - previous) mod 2^16`.
pub fn event_time_delta(current: u16, previous: u16) -> u16 {
    current.wrapping_sub(previous)
}
