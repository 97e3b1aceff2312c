//! Update rate control for speed reading streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Update rate for [`SpeedReading`](super::SpeedReading) subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every published reading
    OnChange,

    /// At most `hz` readings per second, latest wins.
    /// `Max(0)` is treated as `OnChange`.
    Max(u32),
}

impl UpdateRate {
    /// Throttle interval, if this rate needs one
    pub fn throttle_interval(self) -> Option<Duration> {
        match self {
            UpdateRate::OnChange | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
