//! Error types for the Rackspace client.

use pingwatch_core::{PingwatchError, Stage};
use thiserror::Error;

pub type RackspaceResult<T> = Result<T, RackspaceError>;

#[derive(Debug, Error)]
pub enum RackspaceError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("service catalog has no {0} endpoint")]
    MissingService(&'static str),

    #[error("no compute endpoint for region {0}")]
    UnknownRegion(String),

    #[error("{0} response has no usable Location header")]
    MissingLocation(String),
}

impl RackspaceError {
    /// Convert into the collaborator error for `stage`.
    pub fn at(self, stage: Stage) -> PingwatchError {
        match self {
            RackspaceError::UnknownRegion(region) => PingwatchError::UnknownRegion(region),
            other => PingwatchError::api(stage, other),
        }
    }
}
