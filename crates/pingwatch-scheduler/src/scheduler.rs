//! Scheduler: paced passes over every region.
//!
//! One pass visits the regions in catalog order. After each region the
//! scheduler sleeps `interval / regions`, so a full pass takes at least
//! `interval`; scan time comes on top.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use pingwatch_core::*;

use crate::error::{SchedulerError, SchedulerResult};
use crate::pool::WorkerPool;
use crate::scanner::{FleetScanner, RegionReport};

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every region was visited. Regions that failed under
    /// [`RegionErrorPolicy::Skip`] have no report.
    Completed(Vec<RegionReport>),
    /// Shutdown was requested mid-pass.
    Shutdown,
}

/// The sleep after each region: `interval / regions`.
///
/// Zero regions is a precondition violation, reported as
/// [`SchedulerError::NoRegions`].
pub fn per_region_delay(interval: Duration, regions: usize) -> SchedulerResult<Duration> {
    if regions == 0 {
        return Err(SchedulerError::NoRegions);
    }
    let regions = u32::try_from(regions).unwrap_or(u32::MAX);
    Ok(interval / regions)
}

pub struct Scheduler {
    catalog: Arc<dyn Catalog>,
    scanner: FleetScanner,
    interval: Duration,
    call_timeout: Duration,
    on_region_error: RegionErrorPolicy,
}

impl Scheduler {
    /// Build a scheduler and the one worker pool it uses for its lifetime.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        computes: Arc<dyn ComputeProvider>,
        monitoring: Arc<dyn Monitoring>,
        config: &WatchConfig,
    ) -> Self {
        let pool = WorkerPool::new(config.workers);
        Self {
            catalog,
            scanner: FleetScanner::new(computes, monitoring, pool, config),
            interval: config.interval(),
            call_timeout: config.call_timeout(),
            on_region_error: config.on_region_error,
        }
    }

    /// Run forever.
    ///
    /// Returns only on an error the region policy does not skip, or when
    /// the catalog lists no regions.
    pub async fn run(&self) -> SchedulerResult<()> {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        self.run_until(shutdown_rx).await
    }

    /// Run until `shutdown` changes.
    pub async fn run_until(&self, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            policy = ?self.on_region_error,
            "scheduler started"
        );

        while !*shutdown.borrow() {
            match self.run_pass(&mut shutdown).await {
                Ok(PassOutcome::Completed(reports)) => {
                    let machines: usize = reports.iter().map(|r| r.machines).sum();
                    let rebooted: usize = reports.iter().map(|r| r.rebooted).sum();
                    debug!(regions = reports.len(), machines, rebooted, "pass complete");
                }
                Ok(PassOutcome::Shutdown) => break,
                Err(SchedulerError::Catalog(e)) if self.on_region_error == RegionErrorPolicy::Skip => {
                    error!(error = %e, "region catalog unavailable, skipping pass");
                    if pause(self.interval, &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "scheduler stopped");
                    return Err(e);
                }
            }
        }

        info!("scheduler shutting down");
        Ok(())
    }

    /// One pass over every region currently in the catalog.
    pub async fn run_pass(&self, shutdown: &mut watch::Receiver<bool>) -> SchedulerResult<PassOutcome> {
        let regions = with_deadline(Stage::Catalog, self.call_timeout, self.catalog.regions())
            .await
            .map_err(SchedulerError::Catalog)?;
        let delay = per_region_delay(self.interval, regions.len())?;

        let mut reports = Vec::with_capacity(regions.len());
        for region in &regions {
            match self.scanner.scan_region(region).await {
                Ok(report) => {
                    info!(
                        %region,
                        machines = report.machines,
                        healthy = report.healthy,
                        rebooted = report.rebooted,
                        ineligible = report.ineligible,
                        no_op = report.no_op,
                        failed = report.failed,
                        "region checked"
                    );
                    reports.push(report);
                }
                Err(e) if self.on_region_error == RegionErrorPolicy::Skip => {
                    error!(%region, error = %e, "region scan failed, skipping region");
                }
                Err(e) => return Err(e),
            }

            info!(%region, seconds = delay.as_secs_f64(), "sleeping");
            if pause(delay, shutdown).await {
                return Ok(PassOutcome::Shutdown);
            }
        }

        Ok(PassOutcome::Completed(reports))
    }
}

/// Sleep for `duration`. Returns `true` if shutdown was signalled first.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.changed() => true,
    }
}
