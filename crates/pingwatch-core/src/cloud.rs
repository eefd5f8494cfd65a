//! Collaborator contracts: the catalog, compute and monitoring services.
//!
//! Implementations report failures as [`PingwatchError::Api`](crate::PingwatchError::Api) tagged with
//! the [`Stage`](crate::Stage) of the call. Callers put their own deadline
//! around each call with [`with_deadline`](crate::with_deadline).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PingwatchResult;
use crate::types::*;

/// The identity service catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Regions the compute service currently has endpoints in.
    ///
    /// Re-read every cycle; membership can change between passes.
    async fn regions(&self) -> PingwatchResult<Vec<String>>;
}

/// Hands out a compute client scoped to one region.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    async fn compute(&self, region: &str) -> PingwatchResult<Arc<dyn Compute>>;
}

/// The compute service of a single region.
#[async_trait]
pub trait Compute: Send + Sync {
    /// Every machine in the region, across all result pages.
    async fn list_machines(&self) -> PingwatchResult<Vec<Machine>>;

    /// Issue a soft reboot.
    async fn reboot(&self, machine: &Machine) -> PingwatchResult<()>;
}

/// The monitoring service.
#[async_trait]
pub trait Monitoring: Send + Sync {
    /// One page of the account's entities, starting at `marker`.
    async fn list_entities(&self, marker: Option<&str>) -> PingwatchResult<EntityPage>;

    async fn list_checks(&self, entity_id: &str) -> PingwatchResult<Vec<Check>>;

    async fn create_check(&self, entity_id: &str, check: &NewCheck) -> PingwatchResult<Check>;

    async fn list_metrics(&self, entity_id: &str, check_id: &str) -> PingwatchResult<Vec<Metric>>;

    /// Full-resolution data points of `metric` inside `window`. An empty
    /// series is `Ok(vec![])`.
    async fn fetch_points(
        &self,
        entity_id: &str,
        check_id: &str,
        metric: &str,
        window: &AvailabilityWindow,
    ) -> PingwatchResult<Vec<DataPoint>>;

    async fn list_notification_plans(&self) -> PingwatchResult<Vec<NotificationPlan>>;

    async fn create_alarm(&self, entity_id: &str, alarm: &NewAlarm) -> PingwatchResult<()>;
}
