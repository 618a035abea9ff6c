//! Time utilities.
//!
//! `sleep` and `timeout` come from Tokio's timer wheel; `Duration` and `Instant`
//! are the std types so callers can mix them freely with `std::time`.

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
pub use tokio::time::{error::Elapsed, interval, sleep, timeout, Interval, Sleep, Timeout};
