//! Speed sensing: wheel-revolution decoding, location dead-banding and arbitration
//!
//! These are synchronous state machines with the clock passed in; the
//! [`driver`](crate::driver) runs them on live event channels.

pub mod arbiter;
pub mod decoder;
pub mod location;

pub use arbiter::SpeedSourceArbiter;
pub use decoder::{DecodeOutcome, WheelRevolutionDecoder, parse_notification};
pub use location::LocationSpeedFilter;
