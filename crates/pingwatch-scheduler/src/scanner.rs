//! Fleet scanner: checks every machine of one region.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use pingwatch_core::*;
use pingwatch_health::{ProbeLocator, RemediationPolicy, evaluate};

use crate::error::{SchedulerError, SchedulerResult};
use crate::pool::WorkerPool;

/// How one machine's check ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MachineOutcome {
    Decided(RemediationDecision),
    /// A collaborator call failed or timed out; nothing was decided.
    Failed,
}

/// Per-region tally of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionReport {
    pub region: String,
    pub machines: usize,
    pub no_op: usize,
    pub healthy: usize,
    pub rebooted: usize,
    pub ineligible: usize,
    pub failed: usize,
}

impl RegionReport {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: MachineOutcome) {
        self.machines += 1;
        match outcome {
            MachineOutcome::Decided(RemediationDecision::NoOp) => self.no_op += 1,
            MachineOutcome::Decided(RemediationDecision::Healthy { .. }) => self.healthy += 1,
            MachineOutcome::Decided(RemediationDecision::Reboot { .. }) => self.rebooted += 1,
            MachineOutcome::Decided(RemediationDecision::Ineligible { .. }) => self.ineligible += 1,
            MachineOutcome::Failed => self.failed += 1,
        }
    }
}

/// Lists a region's machines and checks each one on the worker pool.
pub struct FleetScanner {
    computes: Arc<dyn ComputeProvider>,
    locator: ProbeLocator,
    policy: Arc<RemediationPolicy>,
    pool: WorkerPool,
    window: Duration,
    call_timeout: Duration,
}

impl FleetScanner {
    pub fn new(
        computes: Arc<dyn ComputeProvider>,
        monitoring: Arc<dyn Monitoring>,
        pool: WorkerPool,
        config: &WatchConfig,
    ) -> Self {
        Self {
            computes,
            locator: ProbeLocator::new(monitoring, config.call_timeout()),
            policy: Arc::new(RemediationPolicy::from_config(config)),
            pool,
            window: config.availability_window(),
            call_timeout: config.call_timeout(),
        }
    }

    /// Check every machine in `region` and return once all are done.
    ///
    /// Fails only when the region itself cannot be reached or listed.
    pub async fn scan_region(&self, region: &str) -> SchedulerResult<RegionReport> {
        let region_error = |source| SchedulerError::Region {
            region: region.to_string(),
            source,
        };

        let compute = self.computes.compute(region).await.map_err(region_error)?;
        info!(%region, "checking pings");

        let machines = with_deadline(Stage::ListMachines, self.call_timeout, compute.list_machines())
            .await
            .map_err(region_error)?;
        debug!(%region, servers = machines.len(), "listed servers");

        // Entities are listed once per scan and shared by every machine.
        let locator = Arc::new(self.locator.for_scan());
        let results = self
            .pool
            .run_all(machines, |machine| {
                let check = MachineCheck {
                    region: region.to_string(),
                    compute: compute.clone(),
                    locator: locator.clone(),
                    policy: self.policy.clone(),
                    window: self.window,
                };
                async move { check.run(machine).await }
            })
            .await;

        let mut report = RegionReport::new(region);
        for result in results {
            match result {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(%region, error = %e, "machine check task died");
                    report.record(MachineOutcome::Failed);
                }
            }
        }
        Ok(report)
    }
}

/// One machine's pipeline: probe → samples → score → decision.
struct MachineCheck {
    region: String,
    compute: Arc<dyn Compute>,
    locator: Arc<ProbeLocator>,
    policy: Arc<RemediationPolicy>,
    window: Duration,
}

impl MachineCheck {
    async fn run(self, machine: Machine) -> MachineOutcome {
        info!(region = %self.region, machine = %machine.name, "checking ping");
        match self.decide(&machine).await {
            Ok(decision) => MachineOutcome::Decided(decision),
            Err(e) => {
                error!(
                    region = %self.region,
                    machine = %machine.name,
                    stage = ?e.stage(),
                    error = %e,
                    "ping check failed"
                );
                MachineOutcome::Failed
            }
        }
    }

    async fn decide(&self, machine: &Machine) -> PingwatchResult<RemediationDecision> {
        let Some(probe) = self.locator.find_probe(machine).await? else {
            return Ok(RemediationDecision::NoOp);
        };

        let window = AvailabilityWindow::trailing(self.window);
        let samples = self.locator.sample_availability(&probe, &window).await?;
        if samples.is_empty() {
            warn!(region = %self.region, machine = %machine.name, "no points");
        }

        let availability = evaluate(&machine.name, &samples);
        self.policy
            .enforce(self.compute.as_ref(), machine, availability)
            .await
    }
}
