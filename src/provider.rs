//! Producer traits for the two speed sources
//!
//! The host application bridges its platform Bluetooth stack and location service
//! through these traits. Each producer is owned by its own pump task in the
//! [`Driver`](crate::driver::Driver), so implementations only need `&mut self`.

use crate::Result;
use crate::types::LocationSample;

/// Something that happened on the wheel-sensor link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A sensor was connected and its notifications subscribed
    Connected { device: String },
    /// One raw measurement notification
    Notification(Vec<u8>),
    /// The sensor went away
    Disconnected,
}

/// Bluetooth LE wheel-revolution sensor link.
#[async_trait::async_trait]
pub trait WheelSensorLink: Send + 'static {
    /// Start scanning for a sensor.
    ///
    /// Must be idempotent: a second call while scanning is a no-op.
    async fn start_discovery(&mut self) -> Result<()>;

    /// Stop an active scan.
    async fn stop_discovery(&mut self) -> Result<()>;

    fn is_scanning(&self) -> bool;

    /// Wait for the next link event
    ///
    /// Returns:
    /// - `Ok(Some(event))` - event available
    /// - `Ok(None)` - link closed for good (normal termination)
    /// - `Err(e)` - transient failure; the driver backs off and retries
    async fn next_event(&mut self) -> Result<Option<LinkEvent>>;
}

/// Platform location updates.
#[async_trait::async_trait]
pub trait LocationFeed: Send + 'static {
    /// Wait for the next location sample. `Ok(None)` ends the feed.
    async fn next_sample(&mut self) -> Result<Option<LocationSample>>;
}
