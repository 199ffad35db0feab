use std::time::Duration;

mod error;
pub mod leader;
pub mod patch;
pub use error::*;

pub(crate) const PROBE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub(crate) const ERROR_REQUEUE: Duration = Duration::from_secs(30);
pub(crate) const HUB_ACK_RETRY: Duration = Duration::from_secs(10);
