//! Scheduler scenarios against an in-memory cloud.
//!
//! Covers the full catalog → region → machine → reboot path, pacing
//! between regions, fan-out under load, and the region error policies.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use pingwatch_core::testing::FakeCloud;
use pingwatch_core::*;
use pingwatch_scheduler::*;

fn config(workers: usize, interval_secs: u64) -> WatchConfig {
    WatchConfig {
        workers,
        interval_secs,
        call_timeout_secs: 5,
        ..Default::default()
    }
}

fn scheduler(cloud: &FakeCloud, config: &WatchConfig) -> Scheduler {
    Scheduler::new(cloud.catalog(), cloud.computes(), cloud.monitoring(), config)
}

#[derive(Debug, Clone)]
struct LogLine {
    level: Level,
    message: String,
    machine: Option<String>,
}

/// Collects every event emitted on the current thread.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<LogLine>>>);

impl LogCapture {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    fn warnings_for(&self, machine: &str) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.level == Level::WARN && line.machine.as_deref() == Some(machine))
            .map(|line| line.message.clone())
            .collect()
    }
}

#[derive(Default)]
struct LineFields {
    message: String,
    machine: Option<String>,
}

impl Visit for LineFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_debug(field, &value as &dyn fmt::Debug);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let shown = format!("{value:?}");
        let shown = shown.trim_matches('"').to_string();
        match field.name() {
            "message" => self.message = shown,
            "machine" => self.machine = Some(shown),
            _ => {}
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = LineFields::default();
        event.record(&mut fields);
        self.0.lock().unwrap().push(LogLine {
            level: *event.metadata().level(),
            message: fields.message,
            machine: fields.machine,
        });
    }
}

#[tokio::test(start_paused = true)]
async fn reboots_only_the_unavailable_eligible_machine() {
    // m1 averages 8% over 5 samples; m2 has no monitoring entity.
    let cloud = FakeCloud::new()
        .with_machine("A", "m1.tmpnb.org")
        .with_machine("A", "m2.tmpnb.org")
        .with_ping("m1.tmpnb.org", &[0.0, 10.0, 10.0, 10.0, 10.0]);
    let scheduler = scheduler(&cloud, &config(10, 600));
    let (_tx, mut rx) = watch::channel(false);
    let logs = LogCapture::default();
    let _guard = logs.install();

    let outcome = scheduler.run_pass(&mut rx).await.unwrap();

    assert_eq!(cloud.reboots(), vec!["m1.tmpnb.org"]);
    assert_eq!(logs.warnings_for("m2.tmpnb.org"), vec!["no monitoring entity"]);
    assert_eq!(logs.warnings_for("m1.tmpnb.org"), vec!["rebooting"]);
    let PassOutcome::Completed(reports) = outcome else {
        panic!("pass was interrupted");
    };
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].rebooted, 1);
    assert_eq!(reports[0].no_op, 1);
    assert_eq!(reports[0].failed, 0);
}

#[tokio::test(start_paused = true)]
async fn fifty_machines_all_checked_before_sleeping() {
    let mut cloud = FakeCloud::new().with_latency(Duration::from_millis(20));
    for i in 0..50 {
        let name = format!("nb-{i}.tmpnb.org");
        cloud = cloud.with_machine("A", &name).with_ping(&name, &[100.0]);
    }
    let scheduler = scheduler(&cloud, &config(10, 600));
    let (_tx, mut rx) = watch::channel(false);

    let outcome = scheduler.run_pass(&mut rx).await.unwrap();

    let PassOutcome::Completed(reports) = outcome else {
        panic!("pass was interrupted");
    };
    assert_eq!(reports[0].machines, 50);
    assert_eq!(reports[0].healthy, 50);
    assert!(cloud.max_in_flight() <= 10, "pool width exceeded: {}", cloud.max_in_flight());
    assert!(cloud.max_in_flight() > 1, "checks did not run concurrently");
}

#[tokio::test(start_paused = true)]
async fn pass_sleeps_interval_split_across_regions() {
    let cloud = FakeCloud::new()
        .with_region("DFW")
        .with_region("ORD")
        .with_region("IAD");
    let scheduler = scheduler(&cloud, &config(10, 600));
    let (_tx, mut rx) = watch::channel(false);

    let started = Instant::now();
    scheduler.run_pass(&mut rx).await.unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(600));
    assert_eq!(cloud.listed_regions(), vec!["DFW", "ORD", "IAD"]);
}

#[tokio::test(start_paused = true)]
async fn second_region_waits_for_first_regions_delay() {
    let cloud = FakeCloud::new().with_region("DFW").with_region("ORD");
    let scheduler = Arc::new(scheduler(&cloud, &config(10, 600)));
    let (tx, rx) = watch::channel(false);

    let task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_until(rx).await })
    };

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(cloud.listed_regions(), vec!["DFW"]);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(cloud.listed_regions(), vec!["DFW", "ORD"]);

    tx.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn zero_regions_fails_fast() {
    let cloud = FakeCloud::new();
    let err = scheduler(&cloud, &config(10, 600)).run().await.unwrap_err();
    assert!(matches!(err, SchedulerError::NoRegions));
}

#[tokio::test(start_paused = true)]
async fn failing_region_is_skipped_by_default() {
    let cloud = FakeCloud::new()
        .with_machine("DFW", "a.tmpnb.org")
        .with_machine("ORD", "b.tmpnb.org")
        .with_ping("b.tmpnb.org", &[0.0])
        .with_failing_region("DFW");
    let scheduler = scheduler(&cloud, &config(10, 600));
    let (_tx, mut rx) = watch::channel(false);

    let outcome = scheduler.run_pass(&mut rx).await.unwrap();

    let PassOutcome::Completed(reports) = outcome else {
        panic!("pass was interrupted");
    };
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].region, "ORD");
    assert_eq!(cloud.reboots(), vec!["b.tmpnb.org"]);
}

#[tokio::test(start_paused = true)]
async fn failing_region_aborts_under_abort_policy() {
    let cloud = FakeCloud::new()
        .with_machine("DFW", "a.tmpnb.org")
        .with_machine("ORD", "b.tmpnb.org")
        .with_failing_region("DFW");
    let config = WatchConfig {
        on_region_error: RegionErrorPolicy::Abort,
        ..config(10, 600)
    };

    let err = scheduler(&cloud, &config).run().await.unwrap_err();

    assert!(matches!(err, SchedulerError::Region { ref region, .. } if region == "DFW"));
    assert_eq!(cloud.listed_regions(), vec!["DFW"]);
}

#[tokio::test(start_paused = true)]
async fn catalog_failure_skips_pass_until_shutdown() {
    let cloud = FakeCloud::new().with_region("DFW").with_failing_catalog();
    let scheduler = Arc::new(scheduler(&cloud, &config(10, 600)));
    let (tx, rx) = watch::channel(false);

    let task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_until(rx).await })
    };

    // Attempts at t=0, 600 and 1200.
    tokio::time::sleep(Duration::from_secs(590)).await;
    assert_eq!(cloud.catalog_calls(), 1);
    tokio::time::sleep(Duration::from_secs(1160)).await;
    assert_eq!(cloud.catalog_calls(), 3);
    tx.send(true).unwrap();

    task.await.unwrap().unwrap();
    assert_eq!(cloud.catalog_calls(), 3);
    assert!(cloud.listed_regions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn catalog_failure_aborts_under_abort_policy() {
    let cloud = FakeCloud::new().with_region("DFW").with_failing_catalog();
    let config = WatchConfig {
        on_region_error: RegionErrorPolicy::Abort,
        ..config(10, 600)
    };

    let err = scheduler(&cloud, &config).run().await.unwrap_err();
    assert!(matches!(err, SchedulerError::Catalog(_)));
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_sleep() {
    let cloud = FakeCloud::new().with_machine("DFW", "a");
    let scheduler = Arc::new(scheduler(&cloud, &config(10, 3600)));
    let (tx, rx) = watch::channel(false);

    let task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_until(rx).await })
    };

    tokio::time::sleep(Duration::from_secs(10)).await;
    let before = Instant::now();
    tx.send(true).unwrap();
    task.await.unwrap().unwrap();

    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(cloud.listed_regions(), vec!["DFW"]);
}

#[tokio::test(start_paused = true)]
async fn fresh_probe_yields_no_decision_in_same_pass() {
    let cloud = FakeCloud::new()
        .with_machine("DFW", "new.tmpnb.org")
        .with_entity("new.tmpnb.org")
        .with_notification_plan("np1");
    let scheduler = scheduler(&cloud, &config(10, 60));
    let (_tx, mut rx) = watch::channel(false);

    let PassOutcome::Completed(reports) = scheduler.run_pass(&mut rx).await.unwrap() else {
        panic!("pass was interrupted");
    };
    assert_eq!(reports[0].no_op, 1);
    assert_eq!(cloud.created_checks().len(), 1);
    assert_eq!(cloud.created_alarms().len(), 1);
    assert!(cloud.reboots().is_empty());

    // Next pass the check exists but has no points yet: still no decision,
    // and nothing is created twice.
    let PassOutcome::Completed(reports) = scheduler.run_pass(&mut rx).await.unwrap() else {
        panic!("pass was interrupted");
    };
    assert_eq!(reports[0].no_op, 1);
    assert_eq!(cloud.created_checks().len(), 1);
}
