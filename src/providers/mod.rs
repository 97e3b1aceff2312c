//! Producer implementations

pub mod channel;

pub use channel::{
    ChannelLocationFeed, ChannelSensorLink, LocationFeedHandle, SensorLinkHandle, location_channel,
    sensor_link_channel,
};
