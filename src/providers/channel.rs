//! Channel-backed producers
//!
//! Platform callbacks (BLE notifications, location updates) arrive on threads the
//! host does not control. These producers let the host push events through a cloneable
//! handle while the driver pulls them through the producer traits.
//!
//! ```rust
//! use tirelab::providers::sensor_link_channel;
//!
//! let (link, handle) = sensor_link_channel(64);
//! // from a platform callback:
//! handle.try_notify(vec![0x01, 10, 0, 0, 0, 0x00, 0x04]).ok();
//! # drop(link);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::provider::{LinkEvent, LocationFeed, WheelSensorLink};
use crate::types::LocationSample;
use crate::{Result, TelemetryError};

#[derive(Debug, Default)]
struct ScanState {
    radio_off: AtomicBool,
    scanning: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// Create a channel-backed sensor link and the handle that feeds it.
pub fn sensor_link_channel(capacity: usize) -> (ChannelSensorLink, SensorLinkHandle) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let state = Arc::new(ScanState::default());
    (
        ChannelSensorLink { events: rx, state: Arc::clone(&state) },
        SensorLinkHandle { events: tx, state },
    )
}

/// Create a channel-backed location feed and the handle that feeds it.
pub fn location_channel(capacity: usize) -> (ChannelLocationFeed, LocationFeedHandle) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelLocationFeed { samples: rx }, LocationFeedHandle { samples: tx })
}

/// [`WheelSensorLink`] fed by a [`SensorLinkHandle`].
#[derive(Debug)]
pub struct ChannelSensorLink {
    events: mpsc::Receiver<Result<LinkEvent>>,
    state: Arc<ScanState>,
}

#[async_trait::async_trait]
impl WheelSensorLink for ChannelSensorLink {
    async fn start_discovery(&mut self) -> Result<()> {
        if self.state.radio_off.load(Ordering::SeqCst) {
            return Err(TelemetryError::discovery_failed("Bluetooth radio is off"));
        }
        if !self.state.scanning.swap(true, Ordering::SeqCst) {
            self.state.starts.fetch_add(1, Ordering::SeqCst);
            debug!("Discovery scan started");
        }
        Ok(())
    }

    async fn stop_discovery(&mut self) -> Result<()> {
        if self.state.scanning.swap(false, Ordering::SeqCst) {
            self.state.stops.fetch_add(1, Ordering::SeqCst);
            debug!("Discovery scan stopped");
        }
        Ok(())
    }

    fn is_scanning(&self) -> bool {
        self.state.scanning.load(Ordering::SeqCst)
    }

    async fn next_event(&mut self) -> Result<Option<LinkEvent>> {
        let event = match self.events.recv().await {
            Some(event) => event?,
            None => return Ok(None),
        };
        // connecting ends the scan
        if matches!(event, LinkEvent::Connected { .. }) {
            self.state.scanning.store(false, Ordering::SeqCst);
        }
        trace!(?event, "Link event");
        Ok(Some(event))
    }
}

/// Cloneable producer side of a [`ChannelSensorLink`].
#[derive(Debug, Clone)]
pub struct SensorLinkHandle {
    events: mpsc::Sender<Result<LinkEvent>>,
    state: Arc<ScanState>,
}

impl SensorLinkHandle {
    pub async fn send(&self, event: LinkEvent) -> Result<()> {
        self.events.send(Ok(event)).await.map_err(|_| closed())
    }

    /// Non-blocking send for synchronous callbacks; fails when the queue is full.
    pub fn try_send(&self, event: LinkEvent) -> Result<()> {
        self.events.try_send(Ok(event)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TelemetryError::connection_failed("sensor link queue is full")
            }
            mpsc::error::TrySendError::Closed(_) => closed(),
        })
    }

    pub async fn connected(&self, device: impl Into<String>) -> Result<()> {
        self.send(LinkEvent::Connected { device: device.into() }).await
    }

    pub async fn notify(&self, frame: impl Into<Vec<u8>>) -> Result<()> {
        self.send(LinkEvent::Notification(frame.into())).await
    }

    pub fn try_notify(&self, frame: impl Into<Vec<u8>>) -> Result<()> {
        self.try_send(LinkEvent::Notification(frame.into()))
    }

    pub async fn disconnected(&self) -> Result<()> {
        self.send(LinkEvent::Disconnected).await
    }

    /// Deliver a transient link error to the driver.
    pub async fn fail(&self, error: TelemetryError) -> Result<()> {
        self.events.send(Err(error)).await.map_err(|_| closed())
    }

    pub fn is_scanning(&self) -> bool {
        self.state.scanning.load(Ordering::SeqCst)
    }

    /// Report the platform radio state. While the radio is off, discovery requests
    /// fail with a retryable `Discovery` error.
    pub fn set_radio_available(&self, available: bool) {
        self.state.radio_off.store(!available, Ordering::SeqCst);
        if !available {
            self.state.scanning.store(false, Ordering::SeqCst);
        }
    }

    /// Number of scans actually started.
    pub fn discovery_starts(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    /// Number of active scans stopped.
    pub fn discovery_stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }
}

/// [`LocationFeed`] fed by a [`LocationFeedHandle`].
#[derive(Debug)]
pub struct ChannelLocationFeed {
    samples: mpsc::Receiver<Result<LocationSample>>,
}

#[async_trait::async_trait]
impl LocationFeed for ChannelLocationFeed {
    async fn next_sample(&mut self) -> Result<Option<LocationSample>> {
        match self.samples.recv().await {
            Some(sample) => sample.map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationFeedHandle {
    samples: mpsc::Sender<Result<LocationSample>>,
}

impl LocationFeedHandle {
    pub async fn send(&self, sample: LocationSample) -> Result<()> {
        self.samples.send(Ok(sample)).await.map_err(|_| closed())
    }

    pub fn try_send(&self, sample: LocationSample) -> Result<()> {
        self.samples.try_send(Ok(sample)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TelemetryError::connection_failed("location queue is full")
            }
            mpsc::error::TrySendError::Closed(_) => closed(),
        })
    }

    pub async fn fail(&self, error: TelemetryError) -> Result<()> {
        self.samples.send(Err(error)).await.map_err(|_| closed())
    }
}

fn closed() -> TelemetryError {
    TelemetryError::connection_failed_with_source(
        "speed sensor service is no longer receiving",
        Box::new(mpsc::error::SendError(())),
    )
}
