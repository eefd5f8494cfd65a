//! Ping probe lookup and sampling.
//!
//! Finds the `remote.ping` check watching a machine, creating one (plus
//! an availability alarm) when the machine's entity has none, and pulls
//! the check's availability series for a window.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use pingwatch_core::*;

/// Zones a new ping check polls from.
pub const PING_MONITORING_ZONES: [&str; 3] = ["mzdfw", "mziad", "mzord"];

/// Seconds between polls of a new ping check.
pub const PING_PERIOD_SECS: u32 = 60;

/// Seconds a single poll of a new ping check may take.
pub const PING_TIMEOUT_SECS: u32 = 30;

/// Pings sent per poll.
pub const PING_COUNT: u32 = 5;

/// Availability (percent) below which the alarm on a new check is CRITICAL.
pub const ALARM_CRITICAL_BELOW: u32 = 20;

pub const ALARM_LABEL: &str = "ping availability";

/// Outcome of looking up the probe for one machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeLookup {
    /// An existing ping check; its data can be evaluated.
    Found(Probe),
    /// No monitoring entity is labelled with the machine's name.
    NoEntity,
    /// The entity has no public IPv4 alias to ping.
    NoTarget,
    /// A ping check was created this cycle and has no data yet.
    Created(Probe),
}

/// Looks up (and lazily creates) ping checks against the monitoring service.
///
/// The account's entity list is fetched once per locator and reused for
/// every machine; take a [`ProbeLocator::for_scan`] copy per region scan.
pub struct ProbeLocator {
    monitoring: Arc<dyn Monitoring>,
    call_timeout: Duration,
    entities: OnceCell<Vec<Entity>>,
}

impl ProbeLocator {
    pub fn new(monitoring: Arc<dyn Monitoring>, call_timeout: Duration) -> Self {
        Self {
            monitoring,
            call_timeout,
            entities: OnceCell::new(),
        }
    }

    /// A locator on the same service with an empty entity cache.
    pub fn for_scan(&self) -> Self {
        Self::new(self.monitoring.clone(), self.call_timeout)
    }

    /// The probe to evaluate for `machine` this cycle.
    ///
    /// `None` when there is no entity or the check was just created.
    pub async fn find_probe(&self, machine: &Machine) -> PingwatchResult<Option<Probe>> {
        match self.locate(machine).await? {
            ProbeLookup::Found(probe) => Ok(Some(probe)),
            ProbeLookup::NoEntity | ProbeLookup::NoTarget | ProbeLookup::Created(_) => Ok(None),
        }
    }

    /// Resolve `machine` to its ping check, creating one if needed.
    ///
    /// The entity label must equal the machine name exactly. When several
    /// ping checks exist the first one listed wins.
    pub async fn locate(&self, machine: &Machine) -> PingwatchResult<ProbeLookup> {
        let entities = self
            .entities
            .get_or_try_init(|| self.list_entities())
            .await?;

        let Some(entity) = entities.iter().find(|e| e.label == machine.name).cloned() else {
            warn!(machine = %machine.name, "no monitoring entity");
            return Ok(ProbeLookup::NoEntity);
        };

        let checks = with_deadline(
            Stage::ListChecks,
            self.call_timeout,
            self.monitoring.list_checks(&entity.id),
        )
        .await?;

        if let Some(check) = checks.into_iter().find(|c| c.check_type == PING_CHECK_TYPE) {
            return Ok(ProbeLookup::Found(Probe { entity, check }));
        }

        debug!(machine = %machine.name, entity = %entity.id, "no ping check");
        let Some(target_alias) = entity.public_v4_alias().map(str::to_string) else {
            warn!(
                machine = %machine.name,
                entity = %entity.id,
                "entity has no public IPv4 alias, cannot create ping check"
            );
            return Ok(ProbeLookup::NoTarget);
        };

        let check = self.create_ping(machine, &entity, target_alias).await?;
        Ok(ProbeLookup::Created(Probe { entity, check }))
    }

    /// Every entity on the account. The deadline applies to each page.
    async fn list_entities(&self) -> PingwatchResult<Vec<Entity>> {
        let mut entities = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = with_deadline(
                Stage::ListEntities,
                self.call_timeout,
                self.monitoring.list_entities(marker.as_deref()),
            )
            .await?;
            entities.extend(page.entities);

            match page.next_marker {
                Some(next) if marker.as_deref() != Some(next.as_str()) => marker = Some(next),
                _ => break,
            }
        }
        debug!(count = entities.len(), "listed monitoring entities");
        Ok(entities)
    }

    async fn create_ping(
        &self,
        machine: &Machine,
        entity: &Entity,
        target_alias: String,
    ) -> PingwatchResult<Check> {
        let new_check = NewCheck {
            label: format!("ping {}", machine.name),
            check_type: PING_CHECK_TYPE.to_string(),
            target_alias,
            monitoring_zones_poll: PING_MONITORING_ZONES.iter().map(|z| z.to_string()).collect(),
            period: PING_PERIOD_SECS,
            timeout: PING_TIMEOUT_SECS,
            details: json!({ "count": PING_COUNT }),
        };

        let check = with_deadline(
            Stage::CreateCheck,
            self.call_timeout,
            self.monitoring.create_check(&entity.id, &new_check),
        )
        .await?;
        info!(
            machine = %machine.name,
            entity = %entity.id,
            check = %check.id,
            target = %new_check.target_alias,
            "created ping check"
        );

        let plans = with_deadline(
            Stage::ListNotificationPlans,
            self.call_timeout,
            self.monitoring.list_notification_plans(),
        )
        .await?;

        match plans.first() {
            Some(plan) => {
                let alarm = NewAlarm {
                    check_id: check.id.clone(),
                    notification_plan_id: plan.id.clone(),
                    criteria: alarm_criteria(),
                    label: ALARM_LABEL.to_string(),
                };
                with_deadline(
                    Stage::CreateAlarm,
                    self.call_timeout,
                    self.monitoring.create_alarm(&entity.id, &alarm),
                )
                .await?;
                debug!(machine = %machine.name, plan = %plan.id, "created ping alarm");
            }
            None => {
                warn!(machine = %machine.name, "no notification plan, ping check has no alarm");
            }
        }

        Ok(check)
    }

    /// Every availability sample of `probe` within `window`.
    ///
    /// Only metrics named `*.available` are read, one series per polling
    /// zone. No data is an empty vec, not an error.
    pub async fn sample_availability(
        &self,
        probe: &Probe,
        window: &AvailabilityWindow,
    ) -> PingwatchResult<Vec<Sample>> {
        let entity_id = &probe.entity.id;
        let check_id = &probe.check.id;

        let metrics = with_deadline(
            Stage::ListMetrics,
            self.call_timeout,
            self.monitoring.list_metrics(entity_id, check_id),
        )
        .await?;

        let mut samples = Vec::new();
        for metric in metrics.iter().filter(|m| m.is_availability()) {
            let points = with_deadline(
                Stage::FetchPoints,
                self.call_timeout,
                self.monitoring.fetch_points(entity_id, check_id, &metric.name, window),
            )
            .await?;

            samples.extend(points.into_iter().map(|p| Sample {
                metric: metric.name.clone(),
                timestamp: p.timestamp,
                average: p.average,
            }));
        }

        Ok(samples)
    }
}

/// Alarm DSL for a new ping check.
fn alarm_criteria() -> String {
    format!(
        "if (metric['available'] < {ALARM_CRITICAL_BELOW}) {{ return new AlarmStatus(CRITICAL); }} \
         return new AlarmStatus(OK);"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingwatch_core::testing::FakeCloud;

    fn machine(name: &str) -> Machine {
        Machine {
            id: format!("srv-{name}"),
            name: name.to_string(),
            region: "DFW".to_string(),
        }
    }

    fn locator(cloud: &FakeCloud) -> ProbeLocator {
        ProbeLocator::new(cloud.monitoring(), Duration::from_secs(5))
    }

    fn window() -> AvailabilityWindow {
        AvailabilityWindow::trailing(Duration::from_secs(300))
    }

    #[tokio::test]
    async fn finds_existing_ping_check() {
        let cloud = FakeCloud::new().with_ping("nb-1.tmpnb.org", &[100.0]);
        let probe = locator(&cloud)
            .find_probe(&machine("nb-1.tmpnb.org"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(probe.entity.label, "nb-1.tmpnb.org");
        assert_eq!(probe.check.check_type, PING_CHECK_TYPE);
        assert!(cloud.created_checks().is_empty());
    }

    #[tokio::test]
    async fn missing_entity_is_absent() {
        let cloud = FakeCloud::new().with_entity("other");
        let lookup = locator(&cloud).locate(&machine("nb-1")).await.unwrap();
        assert_eq!(lookup, ProbeLookup::NoEntity);
        assert!(cloud.created_checks().is_empty());
    }

    #[tokio::test]
    async fn label_match_is_exact_and_case_sensitive() {
        let cloud = FakeCloud::new()
            .with_ping("NB-1", &[100.0])
            .with_ping("nb-10", &[100.0]);
        let lookup = locator(&cloud).locate(&machine("nb-1")).await.unwrap();
        assert_eq!(lookup, ProbeLookup::NoEntity);
    }

    #[tokio::test]
    async fn picks_first_ping_among_other_checks() {
        let cloud = FakeCloud::new()
            .with_check("nb-1", "remote.http")
            .with_check("nb-1", PING_CHECK_TYPE)
            .with_check("nb-1", PING_CHECK_TYPE);
        let probe = locator(&cloud).find_probe(&machine("nb-1")).await.unwrap().unwrap();
        assert_eq!(probe.check.id, "ch-nb-1-1");
    }

    #[tokio::test]
    async fn creates_ping_and_alarm_when_missing() {
        let cloud = FakeCloud::new()
            .with_check("nb-1", "remote.http")
            .with_notification_plan("npFirst")
            .with_notification_plan("npSecond");
        let locator = locator(&cloud);

        let lookup = locator.locate(&machine("nb-1")).await.unwrap();
        assert!(matches!(lookup, ProbeLookup::Created(_)));

        let created = cloud.created_checks();
        assert_eq!(created.len(), 1);
        let (entity_id, check) = &created[0];
        assert_eq!(entity_id, "en-nb-1");
        assert_eq!(check.check_type, PING_CHECK_TYPE);
        assert_eq!(check.target_alias, "public0_v4");
        assert_eq!(check.monitoring_zones_poll, vec!["mzdfw", "mziad", "mzord"]);
        assert_eq!(check.period, 60);
        assert_eq!(check.timeout, 30);
        assert_eq!(check.details, json!({ "count": 5 }));

        let alarms = cloud.created_alarms();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].1.notification_plan_id, "npFirst");
        assert!(alarms[0].1.criteria.contains("metric['available'] < 20"));
        assert!(alarms[0].1.criteria.contains("CRITICAL"));
    }

    #[tokio::test]
    async fn fresh_probe_is_skipped_this_cycle() {
        let cloud = FakeCloud::new().with_entity("nb-1").with_notification_plan("np");
        let locator = locator(&cloud);

        assert_eq!(locator.find_probe(&machine("nb-1")).await.unwrap(), None);
        assert_eq!(cloud.created_checks().len(), 1);

        // Next cycle the check exists and is used as-is.
        let probe = locator.find_probe(&machine("nb-1")).await.unwrap();
        assert!(probe.is_some());
        assert_eq!(cloud.created_checks().len(), 1);
    }

    #[tokio::test]
    async fn creates_check_without_alarm_when_no_plan() {
        let cloud = FakeCloud::new().with_entity("nb-1");
        let lookup = locator(&cloud).locate(&machine("nb-1")).await.unwrap();
        assert!(matches!(lookup, ProbeLookup::Created(_)));
        assert!(cloud.created_alarms().is_empty());
    }

    #[tokio::test]
    async fn no_public_alias_creates_nothing() {
        let cloud = FakeCloud::new().with_bare_entity("nb-1").with_notification_plan("np");
        let lookup = locator(&cloud).locate(&machine("nb-1")).await.unwrap();
        assert_eq!(lookup, ProbeLookup::NoTarget);
        assert!(cloud.created_checks().is_empty());
    }

    #[tokio::test]
    async fn samples_only_availability_metrics() {
        let cloud = FakeCloud::new()
            .with_ping("nb-1", &[100.0, 80.0])
            .with_ping_series("nb-1", "mziad.available", vec![json!(60)])
            .with_ping_series("nb-1", "mzdfw.average", vec![json!(12.5)]);
        let locator = locator(&cloud);
        let probe = locator.find_probe(&machine("nb-1")).await.unwrap().unwrap();

        let samples = locator.sample_availability(&probe, &window()).await.unwrap();
        let averages: Vec<_> = samples.iter().map(|s| s.average.clone()).collect();
        assert_eq!(averages, vec![json!(100.0), json!(80.0), json!(60)]);
        assert!(samples.iter().all(|s| s.metric.ends_with(".available")));
    }

    #[tokio::test]
    async fn no_points_is_empty_not_error() {
        let cloud = FakeCloud::new().with_ping("nb-1", &[]);
        let locator = locator(&cloud);
        let probe = locator.find_probe(&machine("nb-1")).await.unwrap().unwrap();
        assert!(locator.sample_availability(&probe, &window()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collaborator_failure_carries_stage() {
        let cloud = FakeCloud::new()
            .with_ping("nb-1", &[100.0])
            .with_failure(Stage::ListChecks);
        let err = locator(&cloud).find_probe(&machine("nb-1")).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::ListChecks));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_fetch_times_out() {
        let cloud = FakeCloud::new()
            .with_ping("nb-1", &[100.0])
            .with_hang(Stage::FetchPoints);
        let locator = locator(&cloud);
        let probe = locator.find_probe(&machine("nb-1")).await.unwrap().unwrap();

        let err = locator.sample_availability(&probe, &window()).await.unwrap_err();
        assert!(matches!(
            err,
            PingwatchError::Timeout { stage: Stage::FetchPoints, .. }
        ));
    }

    #[tokio::test]
    async fn entities_are_listed_once_per_scan() {
        let cloud = FakeCloud::new()
            .with_ping("nb-1", &[100.0])
            .with_ping("nb-2", &[100.0])
            .with_entity("nb-3")
            .with_entity_page_size(2);
        let locator = locator(&cloud);

        assert!(locator.find_probe(&machine("nb-1")).await.unwrap().is_some());
        assert!(locator.find_probe(&machine("nb-2")).await.unwrap().is_some());
        assert_eq!(cloud.entity_pages(), 2);

        let next_scan = locator.for_scan();
        assert!(next_scan.find_probe(&machine("nb-1")).await.unwrap().is_some());
        assert_eq!(cloud.entity_pages(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_entity_pages_each_get_the_full_deadline() {
        // Three pages at 3s each: 9s in total against a 5s deadline.
        let cloud = FakeCloud::new()
            .with_entity("nb-1")
            .with_entity("nb-2")
            .with_ping("nb-3", &[100.0])
            .with_entity_page_size(1)
            .with_latency(Duration::from_secs(3));

        let probe = locator(&cloud).find_probe(&machine("nb-3")).await.unwrap();
        assert!(probe.is_some());
        assert_eq!(cloud.entity_pages(), 3);
    }

    #[tokio::test]
    async fn entity_listing_failure_carries_stage() {
        let cloud = FakeCloud::new()
            .with_ping("nb-1", &[100.0])
            .with_failure(Stage::ListEntities);

        let err = locator(&cloud).find_probe(&machine("nb-1")).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::ListEntities));
    }
}
