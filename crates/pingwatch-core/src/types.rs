//! Domain types for the pingwatch loop.
//!
//! These are transient, per-cycle read copies of what the compute and
//! monitoring services report. Nothing here is persisted.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Check type of a remote ping probe.
pub const PING_CHECK_TYPE: &str = "remote.ping";

/// Suffix of the per-zone availability metrics a ping check reports.
pub const AVAILABLE_METRIC_SUFFIX: &str = ".available";

// ── Compute ────────────────────────────────────────────────────────

/// A virtual machine as listed by the compute service of one region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    /// Compute-service id; the handle a reboot is issued against.
    pub id: String,
    /// Server name, unique within the fleet.
    pub name: String,
    /// Region the machine was listed from.
    pub region: String,
}

// ── Monitoring ─────────────────────────────────────────────────────

/// A monitored entity. Bound to a machine by `label == machine.name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: String,
    pub label: String,
    /// Network aliases (e.g. `public0_v4`) → address.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ip_addresses: BTreeMap<String, String>,
}

impl Entity {
    /// Pick the alias a new ping check should target: `public0_v4` when
    /// present, otherwise the first other public IPv4 alias.
    pub fn public_v4_alias(&self) -> Option<&str> {
        if self.ip_addresses.contains_key("public0_v4") {
            return Some("public0_v4");
        }
        self.ip_addresses
            .keys()
            .find(|alias| alias.starts_with("public") && alias.ends_with("_v4"))
            .map(String::as_str)
    }
}

/// One page of the entity listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPage {
    pub entities: Vec<Entity>,
    /// Where the next page starts; `None` on the last page.
    pub next_marker: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A configured check on an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Check {
    pub id: String,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub check_type: String,
    pub target_alias: Option<String>,
}

/// Request body for creating a check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewCheck {
    pub label: String,
    #[serde(rename = "type")]
    pub check_type: String,
    pub target_alias: String,
    pub monitoring_zones_poll: Vec<String>,
    /// Seconds between polls.
    pub period: u32,
    /// Seconds before a single poll gives up.
    pub timeout: u32,
    pub details: serde_json::Value,
}

/// A metric series reported by a check, e.g. `mzdfw.available`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    pub name: String,
}

impl Metric {
    pub fn is_availability(&self) -> bool {
        self.name.ends_with(AVAILABLE_METRIC_SUFFIX)
    }
}

/// One rolled-up point of a metric series.
///
/// `average` is kept as raw JSON: the monitoring API is not guaranteed
/// to hand back a number, and the evaluator reports what it got.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataPoint {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub average: serde_json::Value,
}

/// A notification plan alarms can be bound to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPlan {
    pub id: String,
    pub label: Option<String>,
}

/// Request body for creating an alarm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAlarm {
    pub check_id: String,
    pub notification_plan_id: String,
    pub criteria: String,
    pub label: String,
}

// ── Evaluation ─────────────────────────────────────────────────────

/// The ping check bound to one machine's entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub entity: Entity,
    pub check: Check,
}

/// A sample of one availability metric.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Sample {
    pub metric: String,
    pub timestamp: i64,
    pub average: serde_json::Value,
}

/// The half-open interval `[start, end)` samples are fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AvailabilityWindow {
    /// The window of length `width` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, width: Duration) -> Self {
        let width = chrono::Duration::from_std(width).unwrap_or(chrono::Duration::MAX);
        let start = end.checked_sub_signed(width).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    /// The window of length `width` ending now.
    pub fn trailing(width: Duration) -> Self {
        Self::ending_at(Utc::now(), width)
    }

    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

/// What the remediation policy concluded for one machine in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RemediationDecision {
    /// No probe or no data this cycle; nothing was evaluated.
    NoOp,
    /// Availability at or above the threshold.
    Healthy { availability: f64 },
    /// Below threshold and eligible; a reboot was issued.
    Reboot { availability: f64 },
    /// Below threshold but outside the remediation allow-list.
    Ineligible { availability: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entity(aliases: &[(&str, &str)]) -> Entity {
        Entity {
            id: "en1".into(),
            label: "nb-1.tmpnb.org".into(),
            ip_addresses: aliases
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn prefers_public0_v4() {
        let e = entity(&[
            ("private0_v4", "10.0.0.2"),
            ("public1_v4", "198.51.100.2"),
            ("public0_v4", "198.51.100.1"),
        ]);
        assert_eq!(e.public_v4_alias(), Some("public0_v4"));
    }

    #[test]
    fn falls_back_to_other_public_v4() {
        let e = entity(&[("private0_v4", "10.0.0.2"), ("public1_v4", "198.51.100.2")]);
        assert_eq!(e.public_v4_alias(), Some("public1_v4"));

        let e = entity(&[("private0_v4", "10.0.0.2"), ("public0_v6", "2001:db8::1")]);
        assert_eq!(e.public_v4_alias(), None);
    }

    #[test]
    fn availability_metric_suffix() {
        assert!(Metric { name: "mzdfw.available".into() }.is_availability());
        assert!(!Metric { name: "mzdfw.average".into() }.is_availability());
        assert!(!Metric { name: "available".into() }.is_availability());
    }

    #[test]
    fn window_spans_width_before_end() {
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let window = AvailabilityWindow::ending_at(end, Duration::from_secs(300));
        assert_eq!(window.end_millis() - window.start_millis(), 300_000);
        assert_eq!(window.end, end);
    }

    #[test]
    fn check_deserializes_type_field() {
        let check: Check = serde_json::from_str(
            r#"{"id":"chA","label":"ping","type":"remote.ping","target_alias":"public0_v4"}"#,
        )
        .unwrap();
        assert_eq!(check.check_type, PING_CHECK_TYPE);
    }

    #[test]
    fn entity_tolerates_null_ip_addresses() {
        let entity: Entity =
            serde_json::from_str(r#"{"id":"en1","label":"a","ip_addresses":null}"#).unwrap();
        assert!(entity.ip_addresses.is_empty());

        let entity: Entity = serde_json::from_str(r#"{"id":"en1","label":"a"}"#).unwrap();
        assert!(entity.ip_addresses.is_empty());
    }

    #[test]
    fn data_point_without_average_is_null() {
        let point: DataPoint =
            serde_json::from_str(r#"{"numPoints":0,"timestamp":1700000000000}"#).unwrap();
        assert!(point.average.is_null());
    }
}
