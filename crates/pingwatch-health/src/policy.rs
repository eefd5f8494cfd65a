//! Reboot policy.
//!
//! Remediation is experimental, so a machine below the threshold is only
//! rebooted when its name contains the configured eligibility substring.
//! Everything else sharing the monitoring account is logged and left alone.

use std::time::Duration;

use tracing::{info, warn};

use pingwatch_core::*;

#[derive(Debug, Clone)]
pub struct RemediationPolicy {
    /// Availability (percent) below which a machine is unhealthy.
    threshold: f64,
    eligible_substring: String,
    dry_run: bool,
    call_timeout: Duration,
}

impl RemediationPolicy {
    pub fn new(threshold: f64, eligible_substring: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            threshold,
            eligible_substring: eligible_substring.into(),
            dry_run: false,
            call_timeout,
        }
    }

    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(
            config.reboot_threshold,
            config.eligible_substring.clone(),
            config.call_timeout(),
        )
        .with_dry_run(config.dry_run)
    }

    /// Log reboots instead of issuing them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_eligible(&self, machine: &Machine) -> bool {
        machine.name.contains(&self.eligible_substring)
    }

    /// Classify an availability score. No side effects.
    pub fn decide(&self, machine: &Machine, availability: Option<f64>) -> RemediationDecision {
        match availability {
            None => RemediationDecision::NoOp,
            Some(availability) if availability >= self.threshold => {
                RemediationDecision::Healthy { availability }
            }
            Some(availability) if self.is_eligible(machine) => {
                RemediationDecision::Reboot { availability }
            }
            Some(availability) => RemediationDecision::Ineligible { availability },
        }
    }

    /// Decide, and reboot `machine` through `compute` when the decision is
    /// [`RemediationDecision::Reboot`].
    pub async fn enforce(
        &self,
        compute: &dyn Compute,
        machine: &Machine,
        availability: Option<f64>,
    ) -> PingwatchResult<RemediationDecision> {
        let decision = self.decide(machine, availability);
        match decision {
            RemediationDecision::NoOp => {}
            RemediationDecision::Healthy { availability } => {
                info!(
                    machine = %machine.name,
                    availability,
                    "server is up"
                );
            }
            RemediationDecision::Reboot { availability } => {
                warn!(
                    machine = %machine.name,
                    availability,
                    threshold = self.threshold,
                    dry_run = self.dry_run,
                    "rebooting"
                );
                if !self.dry_run {
                    with_deadline(Stage::Reboot, self.call_timeout, compute.reboot(machine)).await?;
                }
            }
            RemediationDecision::Ineligible { availability } => {
                warn!(
                    machine = %machine.name,
                    availability,
                    threshold = self.threshold,
                    "below threshold but not eligible for reboot"
                );
            }
        }
        Ok(decision)
    }
}
