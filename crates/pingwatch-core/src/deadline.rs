//! Per-call deadlines for collaborator requests.

use std::future::Future;
use std::time::Duration;

use crate::error::{PingwatchError, PingwatchResult, Stage};

/// Run a collaborator call, failing with [`PingwatchError::Timeout`] if it
/// has not finished within `after`.
///
/// A hung request would otherwise hold a worker slot forever.
pub async fn with_deadline<T, F>(stage: Stage, after: Duration, call: F) -> PingwatchResult<T>
where
    F: Future<Output = PingwatchResult<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(PingwatchError::Timeout { stage, after }),
    }
}
