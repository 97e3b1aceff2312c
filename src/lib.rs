//! Telemetry capture and activity-file encoding for tire pressure test runs.
//!
//! Tirelab fuses a Bluetooth LE wheel-revolution sensor and the platform location
//! provider into one authoritative speed/distance signal, and writes the recorded run
//! as a compact binary activity file that standard fitness tools can import.
//!
//! # Features
//!
//! - **Wraparound-safe decoding**: 32-bit revolution and 16-bit event-time counters
//! - **Source arbitration**: wheel sensor first, location fallback, stall watchdog
//! - **Owned runtime**: [`SpeedSensorService`] with explicit start and shutdown
//! - **Activity files**: header, definition/data records, CRCs, read-back verification
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use std::time::SystemTime;
//! use tirelab::providers::{location_channel, sensor_link_channel};
//! use tirelab::recorder::{ActivityRecorder, DeviceIdentity, RecordSample};
//! use tirelab::{RunConfig, SpeedSensorService, UpdateRate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::load("run.yaml")?;
//!     let (link, _ble) = sensor_link_channel(config.channel_capacity);
//!     let (feed, _gps) = location_channel(config.channel_capacity);
//!     let service = SpeedSensorService::start(config.clone(), link, feed)?;
//!
//!     let mut recorder = ActivityRecorder::create("run-1.fit", DeviceIdentity::default(), &config)?;
//!     recorder.start(SystemTime::now())?;
//!
//!     let mut readings = service.subscribe(UpdateRate::Max(1)).take(60);
//!     while let Some(reading) = readings.next().await {
//!         recorder.record(&RecordSample::from_reading(&reading, SystemTime::now()))?;
//!     }
//!
//!     recorder.finish(SystemTime::now())?;
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod types;

// Speed fusion
pub mod sensor;

// Event-channel runtime
pub mod driver;
pub mod provider;
pub mod providers;
pub mod service;
pub mod stream;

// Activity files
pub mod fit;
pub mod recorder;

// Core exports
pub use config::RunConfig;
pub use error::*;
pub use types::*;

// Main API exports
pub use provider::{LinkEvent, LocationFeed, WheelSensorLink};
pub use recorder::ActivityRecorder;
pub use sensor::{LocationSpeedFilter, SpeedSourceArbiter, WheelRevolutionDecoder};
pub use service::SpeedSensorService;
