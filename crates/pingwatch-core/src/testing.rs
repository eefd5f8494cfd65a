//! In-memory fakes of the cloud collaborators.
//!
//! `FakeCloud` implements every trait in [`crate::cloud`] over one shared
//! state, and records the mutating calls (reboots, created checks and
//! alarms) so tests can assert on them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::cloud::{Catalog, Compute, ComputeProvider, Monitoring};
use crate::error::{PingwatchError, PingwatchResult, Stage};
use crate::types::*;

#[derive(Default)]
struct FakeState {
    regions: Vec<String>,
    machines: BTreeMap<String, Vec<Machine>>,
    entities: Vec<Entity>,
    checks: HashMap<String, Vec<Check>>,
    metrics: HashMap<String, Vec<Metric>>,
    points: HashMap<(String, String), Vec<DataPoint>>,
    plans: Vec<NotificationPlan>,

    failing_catalog: bool,
    failing_regions: HashSet<String>,
    failing_stages: HashSet<Stage>,
    hung_stages: HashSet<Stage>,
    latency: Option<Duration>,
    entity_page_size: Option<usize>,

    reboots: Vec<String>,
    created_checks: Vec<(String, NewCheck)>,
    created_alarms: Vec<(String, NewAlarm)>,
    listed_regions: Vec<String>,
    catalog_calls: usize,
    entity_pages: usize,
}

#[derive(Default)]
struct Shared {
    state: Mutex<FakeState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Common prologue of every fake call: concurrency accounting,
    /// injected latency, hangs and failures.
    async fn enter(&self, stage: Stage) -> PingwatchResult<()> {
        let (latency, hang, fail) = {
            let state = self.state();
            (
                state.latency,
                state.hung_stages.contains(&stage),
                state.failing_stages.contains(&stage),
            )
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(PingwatchError::api(stage, "injected failure"));
        }
        Ok(())
    }
}

/// A scripted cloud: one catalog, compute per region and a monitoring
/// account, all in memory.
#[derive(Clone, Default)]
pub struct FakeCloud {
    shared: Arc<Shared>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.shared.state()
    }

    // ── Builders ───────────────────────────────────────────────────

    pub fn with_region(self, region: &str) -> Self {
        {
            let mut state = self.state();
            if !state.regions.iter().any(|r| r == region) {
                state.regions.push(region.to_string());
                state.machines.entry(region.to_string()).or_default();
            }
        }
        self
    }

    /// Add a machine named `name` to `region` (creating the region).
    pub fn with_machine(self, region: &str, name: &str) -> Self {
        let this = self.with_region(region);
        {
            let mut state = this.state();
            let machines = state.machines.entry(region.to_string()).or_default();
            machines.push(Machine {
                id: format!("srv-{name}"),
                name: name.to_string(),
                region: region.to_string(),
            });
        }
        this
    }

    /// Add a monitoring entity labelled `name` with a `public0_v4` alias.
    pub fn with_entity(self, name: &str) -> Self {
        self.push_entity(name, &[("public0_v4", "198.51.100.10"), ("private0_v4", "10.0.0.10")])
    }

    /// Add a monitoring entity with no public IPv4 alias.
    pub fn with_bare_entity(self, name: &str) -> Self {
        self.push_entity(name, &[("private0_v4", "10.0.0.11")])
    }

    fn push_entity(self, name: &str, aliases: &[(&str, &str)]) -> Self {
        {
            let mut state = self.state();
            if !state.entities.iter().any(|e| e.label == name) {
                state.entities.push(Entity {
                    id: format!("en-{name}"),
                    label: name.to_string(),
                    ip_addresses: aliases
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                });
            }
        }
        self
    }

    /// Add a check of `check_type` to the entity for `name`.
    pub fn with_check(self, name: &str, check_type: &str) -> Self {
        let this = self.with_entity(name);
        {
            let mut state = this.state();
            let checks = state.checks.entry(format!("en-{name}")).or_default();
            let id = format!("ch-{name}-{}", checks.len());
            checks.push(Check {
                id,
                label: Some(format!("{check_type} {name}")),
                check_type: check_type.to_string(),
                target_alias: Some("public0_v4".to_string()),
            });
        }
        this
    }

    /// Give `name` a ping check whose `mzdfw.available` series holds `values`.
    pub fn with_ping(self, name: &str, values: &[f64]) -> Self {
        let raw = values.iter().map(|v| serde_json::json!(v)).collect();
        self.with_ping_series(name, "mzdfw.available", raw)
    }

    /// Add a series of raw `average` payloads to `name`'s ping check,
    /// creating the entity and check on first use.
    pub fn with_ping_series(self, name: &str, metric: &str, averages: Vec<serde_json::Value>) -> Self {
        let has_ping = {
            let state = self.state();
            state
                .checks
                .get(&format!("en-{name}"))
                .is_some_and(|checks| checks.iter().any(|c| c.check_type == PING_CHECK_TYPE))
        };
        let this = if has_ping { self } else { self.with_check(name, PING_CHECK_TYPE) };
        {
            let mut state = this.state();
            let check_id = state.checks[&format!("en-{name}")]
                .iter()
                .find(|c| c.check_type == PING_CHECK_TYPE)
                .map(|c| c.id.clone())
                .unwrap_or_default();
            state
                .metrics
                .entry(check_id.clone())
                .or_default()
                .push(Metric { name: metric.to_string() });
            let points = averages
                .into_iter()
                .enumerate()
                .map(|(i, average)| DataPoint {
                    timestamp: 1_700_000_000_000 + (i as i64) * 60_000,
                    average,
                })
                .collect();
            state.points.insert((check_id, metric.to_string()), points);
        }
        this
    }

    pub fn with_notification_plan(self, id: &str) -> Self {
        self.state().plans.push(NotificationPlan {
            id: id.to_string(),
            label: Some(format!("plan {id}")),
        });
        self
    }

    pub fn with_failing_catalog(self) -> Self {
        self.state().failing_catalog = true;
        self
    }

    /// Make listing machines in `region` fail.
    pub fn with_failing_region(self, region: &str) -> Self {
        self.state().failing_regions.insert(region.to_string());
        self
    }

    /// Make every call of `stage` fail.
    pub fn with_failure(self, stage: Stage) -> Self {
        self.state().failing_stages.insert(stage);
        self
    }

    /// Make every call of `stage` hang forever.
    pub fn with_hang(self, stage: Stage) -> Self {
        self.state().hung_stages.insert(stage);
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = Some(latency);
        self
    }

    /// Serve the entity listing `size` entities per page.
    pub fn with_entity_page_size(self, size: usize) -> Self {
        self.state().entity_page_size = Some(size.max(1));
        self
    }

    // ── Handles ────────────────────────────────────────────────────

    pub fn catalog(&self) -> Arc<dyn Catalog> {
        Arc::new(self.clone())
    }

    pub fn computes(&self) -> Arc<dyn ComputeProvider> {
        Arc::new(self.clone())
    }

    pub fn monitoring(&self) -> Arc<dyn Monitoring> {
        Arc::new(self.clone())
    }

    /// A compute client for `region`, bypassing the provider.
    pub fn region_compute(&self, region: &str) -> Arc<dyn Compute> {
        Arc::new(FakeCompute {
            shared: self.shared.clone(),
            region: region.to_string(),
        })
    }

    // ── Recorded calls ─────────────────────────────────────────────

    /// Names of rebooted machines, in call order.
    pub fn reboots(&self) -> Vec<String> {
        self.state().reboots.clone()
    }

    /// `(entity_id, check)` for every created check.
    pub fn created_checks(&self) -> Vec<(String, NewCheck)> {
        self.state().created_checks.clone()
    }

    /// `(entity_id, alarm)` for every created alarm.
    pub fn created_alarms(&self) -> Vec<(String, NewAlarm)> {
        self.state().created_alarms.clone()
    }

    /// Regions whose machines were listed, in call order.
    pub fn listed_regions(&self) -> Vec<String> {
        self.state().listed_regions.clone()
    }

    /// Entity listing pages served so far.
    pub fn entity_pages(&self) -> usize {
        self.state().entity_pages
    }

    /// How many times the region catalog was asked for, failed calls included.
    pub fn catalog_calls(&self) -> usize {
        self.state().catalog_calls
    }

    /// Highest number of fake calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Catalog for FakeCloud {
    async fn regions(&self) -> PingwatchResult<Vec<String>> {
        self.shared.enter(Stage::Catalog).await?;
        let mut state = self.state();
        state.catalog_calls += 1;
        if state.failing_catalog {
            return Err(PingwatchError::api(Stage::Catalog, "401 Unauthorized"));
        }
        Ok(state.regions.clone())
    }
}

#[async_trait]
impl ComputeProvider for FakeCloud {
    async fn compute(&self, region: &str) -> PingwatchResult<Arc<dyn Compute>> {
        if !self.state().regions.iter().any(|r| r == region) {
            return Err(PingwatchError::UnknownRegion(region.to_string()));
        }
        Ok(self.region_compute(region))
    }
}

struct FakeCompute {
    shared: Arc<Shared>,
    region: String,
}

#[async_trait]
impl Compute for FakeCompute {
    async fn list_machines(&self) -> PingwatchResult<Vec<Machine>> {
        self.shared.enter(Stage::ListMachines).await?;
        let mut state = self.shared.state();
        state.listed_regions.push(self.region.clone());
        if state.failing_regions.contains(&self.region) {
            return Err(PingwatchError::api(Stage::ListMachines, "503 Service Unavailable"));
        }
        Ok(state.machines.get(&self.region).cloned().unwrap_or_default())
    }

    async fn reboot(&self, machine: &Machine) -> PingwatchResult<()> {
        self.shared.enter(Stage::Reboot).await?;
        self.shared.state().reboots.push(machine.name.clone());
        Ok(())
    }
}

#[async_trait]
impl Monitoring for FakeCloud {
    async fn list_entities(&self, marker: Option<&str>) -> PingwatchResult<EntityPage> {
        self.shared.enter(Stage::ListEntities).await?;
        let mut state = self.state();
        state.entity_pages += 1;

        let start = match marker {
            Some(marker) => state
                .entities
                .iter()
                .position(|e| e.id == marker)
                .unwrap_or(state.entities.len()),
            None => 0,
        };
        let rest = &state.entities[start..];
        let take = state.entity_page_size.unwrap_or(rest.len()).min(rest.len());
        Ok(EntityPage {
            entities: rest[..take].to_vec(),
            next_marker: rest.get(take).map(|e| e.id.clone()),
        })
    }

    async fn list_checks(&self, entity_id: &str) -> PingwatchResult<Vec<Check>> {
        self.shared.enter(Stage::ListChecks).await?;
        Ok(self.state().checks.get(entity_id).cloned().unwrap_or_default())
    }

    async fn create_check(&self, entity_id: &str, check: &NewCheck) -> PingwatchResult<Check> {
        self.shared.enter(Stage::CreateCheck).await?;
        let mut state = self.state();
        let checks = state.checks.entry(entity_id.to_string()).or_default();
        let created = Check {
            id: format!("ch-new-{entity_id}-{}", checks.len()),
            label: Some(check.label.clone()),
            check_type: check.check_type.clone(),
            target_alias: Some(check.target_alias.clone()),
        };
        checks.push(created.clone());
        state.created_checks.push((entity_id.to_string(), check.clone()));
        Ok(created)
    }

    async fn list_metrics(&self, _entity_id: &str, check_id: &str) -> PingwatchResult<Vec<Metric>> {
        self.shared.enter(Stage::ListMetrics).await?;
        Ok(self.state().metrics.get(check_id).cloned().unwrap_or_default())
    }

    async fn fetch_points(
        &self,
        _entity_id: &str,
        check_id: &str,
        metric: &str,
        _window: &AvailabilityWindow,
    ) -> PingwatchResult<Vec<DataPoint>> {
        self.shared.enter(Stage::FetchPoints).await?;
        Ok(self
            .state()
            .points
            .get(&(check_id.to_string(), metric.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn list_notification_plans(&self) -> PingwatchResult<Vec<NotificationPlan>> {
        self.shared.enter(Stage::ListNotificationPlans).await?;
        Ok(self.state().plans.clone())
    }

    async fn create_alarm(&self, entity_id: &str, alarm: &NewAlarm) -> PingwatchResult<()> {
        self.shared.enter(Stage::CreateAlarm).await?;
        self.state()
            .created_alarms
            .push((entity_id.to_string(), alarm.clone()));
        Ok(())
    }
}
