//! Speed sensor service
//!
//! The owned component a run holds for its lifetime: created at run start, shut down
//! at run end. It hides the driver tasks behind synchronous reads, subscribable
//! streams and a lap reset.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use tirelab::providers::{location_channel, sensor_link_channel};
//! use tirelab::{RunConfig, SpeedSensorService, UpdateRate};
//!
//! #[tokio::main]
//! async fn main() -> tirelab::Result<()> {
//!     let (link, ble) = sensor_link_channel(64);
//!     let (feed, gps) = location_channel(64);
//!     let service = SpeedSensorService::start(RunConfig::with_circumference(2.105), link, feed)?;
//!
//!     // platform callbacks push into `ble` and `gps`
//!     # drop((ble, gps));
//!     let mut readings = service.subscribe(UpdateRate::Max(4));
//!     while let Some(reading) = readings.next().await {
//!         println!("{:.1} km/h, {:.0} m", reading.speed_kmh, reading.distance_m);
//!     }
//!
//!     service.shutdown().await
//! }
//! ```

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::RunConfig;
use crate::driver::{Driver, DriverCommand};
use crate::provider::{LocationFeed, WheelSensorLink};
use crate::stream::ThrottleExt;
use crate::types::{SpeedReading, UpdateRate};
use crate::{Result, TelemetryError};

/// Fused wheel-sensor and location speed for one run.
pub struct SpeedSensorService {
    readings: watch::Receiver<SpeedReading>,
    commands: mpsc::Sender<DriverCommand>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SpeedSensorService {
    /// Validate `config` and spawn the driver tasks.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start<L, F>(config: RunConfig, link: L, feed: F) -> Result<Self>
    where
        L: WheelSensorLink,
        F: LocationFeed,
    {
        config.validate()?;
        info!(
            circumference_m = config.wheel_circumference_m,
            watchdog = ?config.watchdog_timeout(),
            "Starting speed sensor service"
        );

        let channels = Driver::spawn(config, link, feed);
        Ok(Self {
            readings: channels.readings,
            commands: channels.commands,
            cancel: channels.cancel,
            tasks: channels.tasks,
        })
    }

    /// Latest published reading.
    pub fn current(&self) -> SpeedReading {
        *self.readings.borrow()
    }

    /// Stream of readings, starting with the current one.
    pub fn subscribe(&self, rate: UpdateRate) -> BoxStream<'static, SpeedReading> {
        let readings = WatchStream::new(self.readings.clone());
        match rate.throttle_interval() {
            None => readings.boxed(),
            Some(period) => readings.throttle(period).boxed(),
        }
    }

    /// Stream of readings without the current one.
    pub fn updates(&self) -> impl Stream<Item = SpeedReading> + 'static {
        WatchStream::from_changes(self.readings.clone())
    }

    /// Wait for the next published reading.
    pub async fn changed(&mut self) -> Result<SpeedReading> {
        self.readings.changed().await.map_err(|_| stopped())?;
        Ok(*self.readings.borrow_and_update())
    }

    /// Start a new lap: distance restarts from zero at the current revolution count.
    pub async fn reset_lap(&self) -> Result<()> {
        debug!("Lap reset requested");
        self.commands.send(DriverCommand::ResetLap).await.map_err(|_| stopped())
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Stop all tasks and wait for them. Any running discovery scan is stopped.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down speed sensor service");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Speed sensor task failed: {}", e);
            }
        }
        Ok(())
    }
}

impl Drop for SpeedSensorService {
    fn drop(&mut self) {
        debug!("Dropping speed sensor service");
        self.cancel.cancel();
    }
}

fn stopped() -> TelemetryError {
    TelemetryError::connection_failed("speed sensor service has stopped")
}
