use std::time::Duration;

pub mod leader;
pub mod patch;

#[cfg(feature = "metrics")]
pub mod metrics;

mod error;

pub use error::*;

/// Default interval for requeuing a managed resource after successful work.
pub(crate) const PROBE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Requeue cadence for the RBAC sync reconciler.
pub(crate) const RBAC_SYNC_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Requeue cadence for the usage-metrics reconciler.
pub(crate) const METRICS_INTERVAL: Duration = Duration::from_secs(2 * 60);

/// Requeue delay after a recoverable reconcile failure.
pub(crate) const ERROR_REQUEUE: Duration = Duration::from_secs(30);
