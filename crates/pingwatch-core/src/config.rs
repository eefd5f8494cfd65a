//! pingwatch.toml configuration.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration. The daemon layers CLI flags on top.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PingwatchError, PingwatchResult};

/// What the scheduler does when the catalog or a region cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionErrorPolicy {
    /// Log the failure and move on to the next region (or pass).
    #[default]
    Skip,
    /// Stop the scheduler and return the error.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Ping availability (percent) below which a machine is rebooted.
    pub reboot_threshold: f64,
    /// Width of the sample window, in seconds.
    pub availability_window_secs: u64,
    /// Target duration of one pass over all regions, in seconds.
    pub interval_secs: u64,
    /// Width of the worker pool shared by every region scan.
    pub workers: usize,
    /// Only machines whose name contains this are ever rebooted.
    pub eligible_substring: String,
    /// Deadline for each call to the cloud APIs, in seconds.
    pub call_timeout_secs: u64,
    /// Log eligible reboots instead of issuing them.
    pub dry_run: bool,
    pub on_region_error: RegionErrorPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            reboot_threshold: 10.0,
            availability_window_secs: 300,
            interval_secs: 600,
            workers: 10,
            eligible_substring: "tmpnb.org".to_string(),
            call_timeout_secs: 30,
            dry_run: false,
            on_region_error: RegionErrorPolicy::Skip,
        }
    }
}

impl WatchConfig {
    pub fn from_file(path: &Path) -> PingwatchResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> PingwatchResult<Self> {
        let config: WatchConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> PingwatchResult<()> {
        if self.workers == 0 {
            return Err(PingwatchError::Config("workers must be at least 1".into()));
        }
        if self.interval_secs == 0 {
            return Err(PingwatchError::Config("interval_secs must be positive".into()));
        }
        if self.availability_window_secs == 0 {
            return Err(PingwatchError::Config(
                "availability_window_secs must be positive".into(),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(PingwatchError::Config("call_timeout_secs must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.reboot_threshold) {
            return Err(PingwatchError::Config(format!(
                "reboot_threshold must be a percentage, got {}",
                self.reboot_threshold
            )));
        }
        if self.eligible_substring.is_empty() {
            return Err(PingwatchError::Config(
                "eligible_substring must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn availability_window(&self) -> Duration {
        Duration::from_secs(self.availability_window_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}
