//! Error types shared by every pingwatch crate.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for collaborator and pipeline operations.
pub type PingwatchResult<T> = Result<T, PingwatchError>;

/// The external call a failure happened in.
///
/// Carried on every collaborator error so a log line names the stage
/// without the caller having to wrap it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Catalog,
    ListMachines,
    Reboot,
    ListEntities,
    ListChecks,
    CreateCheck,
    ListMetrics,
    FetchPoints,
    ListNotificationPlans,
    CreateAlarm,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Catalog => "catalog",
            Stage::ListMachines => "list_machines",
            Stage::Reboot => "reboot",
            Stage::ListEntities => "list_entities",
            Stage::ListChecks => "list_checks",
            Stage::CreateCheck => "create_check",
            Stage::ListMetrics => "list_metrics",
            Stage::FetchPoints => "fetch_points",
            Stage::ListNotificationPlans => "list_notification_plans",
            Stage::CreateAlarm => "create_alarm",
        };
        f.write_str(s)
    }
}

/// Errors raised by collaborators, the deadline wrapper and config loading.
#[derive(Debug, Error)]
pub enum PingwatchError {
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("{stage} failed: {message}")]
    Api { stage: Stage, message: String },

    #[error("unknown region: {0}")]
    UnknownRegion(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PingwatchError {
    /// Build an API error for `stage` from anything displayable.
    pub fn api(stage: Stage, message: impl fmt::Display) -> Self {
        PingwatchError::Api {
            stage,
            message: message.to_string(),
        }
    }

    /// The external call this error came from, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PingwatchError::Timeout { stage, .. } | PingwatchError::Api { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}
