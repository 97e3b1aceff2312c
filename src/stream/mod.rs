//! Stream combinators for reading subscriptions

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
