//! Scheduler error types.

use pingwatch_core::PingwatchError;
use thiserror::Error;

/// Errors that escape a region scan or a scheduler pass.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The catalog listed no regions, so a pass cannot be paced.
    #[error("catalog returned no regions; cannot divide the interval across zero regions")]
    NoRegions,

    #[error("region catalog unavailable: {0}")]
    Catalog(#[source] PingwatchError),

    #[error("scan of region {region} failed: {source}")]
    Region {
        region: String,
        #[source]
        source: PingwatchError,
    },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
