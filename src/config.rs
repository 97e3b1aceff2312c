//! Run configuration
//!
//! Everything the capture pipeline needs to know before a run starts. The wheel
//! circumference is computed by the host application (tire size, pressure) and
//! injected here; every other value has a default matching field-tested behaviour.
//!
//! ```rust
//! use tirelab::RunConfig;
//!
//! let config = RunConfig::from_yaml_str("wheel_circumference_m: 2.105\n").unwrap();
//! assert_eq!(config.wheel_circumference_m, 2.105);
//! assert_eq!(config.watchdog_timeout().as_secs(), 15);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::fit::{ChecksumKind, FieldTyping};
use crate::{Result, TelemetryError};

/// Default 700x25c road wheel circumference in metres.
pub const DEFAULT_WHEEL_CIRCUMFERENCE_M: f64 = 2.105;

/// Configuration for one capture run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Rolling circumference of the instrumented wheel in metres
    pub wheel_circumference_m: f64,
    /// Zero the wheel speed after this long without a revolution
    pub watchdog_timeout_ms: u64,
    /// How often the watchdog is evaluated
    pub watchdog_tick_ms: u64,
    /// Location speeds below this are treated as stationary jitter
    pub location_floor_kmh: f64,
    /// Published speeds below this are reported as exactly zero
    pub publish_floor_kmh: f64,
    /// First retry delay after a link error; doubles per consecutive failure
    pub reconnect_backoff_ms: u64,
    /// Upper bound for the retry delay
    pub reconnect_backoff_cap_ms: u64,
    /// Capacity of each producer channel
    pub channel_capacity: usize,
    /// Field typing used by the activity-file encoder
    pub field_typing: FieldTyping,
    /// Checksum variant written into activity files
    pub checksum: ChecksumKind,
    /// Profile version written into the activity file header
    pub profile_version: u16,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            wheel_circumference_m: DEFAULT_WHEEL_CIRCUMFERENCE_M,
            watchdog_timeout_ms: 15_000,
            watchdog_tick_ms: 1_000,
            location_floor_kmh: 3.0,
            publish_floor_kmh: 0.1,
            reconnect_backoff_ms: 50,
            reconnect_backoff_cap_ms: 5_000,
            channel_capacity: 64,
            field_typing: FieldTyping::Legacy,
            checksum: ChecksumKind::Ccitt,
            profile_version: crate::fit::format::DEFAULT_PROFILE_VERSION,
        }
    }
}

impl RunConfig {
    /// Default configuration with the given wheel circumference.
    pub fn with_circumference(wheel_circumference_m: f64) -> Self {
        Self { wheel_circumference_m, ..Self::default() }
    }

    /// Parse a YAML document and validate it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml_ng::from_str(yaml).map_err(|e| TelemetryError::Parse {
            context: "Run configuration".to_string(),
            details: format!("YAML parsing failed: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| TelemetryError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| TelemetryError::Parse {
            context: "Run configuration".to_string(),
            details: format!("YAML serialization failed: {}", e),
        })
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.wheel_circumference_m.is_finite() || self.wheel_circumference_m <= 0.0 {
            return Err(TelemetryError::config_error(format!(
                "wheel circumference must be a positive number of metres, got {}",
                self.wheel_circumference_m
            )));
        }
        if self.watchdog_timeout_ms == 0 || self.watchdog_tick_ms == 0 {
            return Err(TelemetryError::config_error("watchdog durations must be non-zero"));
        }
        if self.reconnect_backoff_ms == 0 || self.reconnect_backoff_cap_ms < self.reconnect_backoff_ms
        {
            return Err(TelemetryError::config_error(
                "reconnect backoff must be non-zero and not exceed its cap",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(TelemetryError::config_error("channel capacity must be non-zero"));
        }
        if !(self.location_floor_kmh >= 0.0 && self.publish_floor_kmh >= 0.0) {
            return Err(TelemetryError::config_error("speed floors must be non-negative"));
        }
        Ok(())
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn watchdog_tick(&self) -> Duration {
        Duration::from_millis(self.watchdog_tick_ms)
    }

    /// Retry delay after `failures` consecutive link errors.
    pub fn reconnect_backoff(&self, failures: u32) -> Duration {
        let factor = 1u64 << failures.saturating_sub(1).min(16);
        let ms = self.reconnect_backoff_ms.saturating_mul(factor).min(self.reconnect_backoff_cap_ms);
        Duration::from_millis(ms)
    }
}
