//! Cloud monitoring: entities, checks, metrics, alarms.

use async_trait::async_trait;

use pingwatch_core::*;

use crate::client::{PAGE_LIMIT, RackspaceClient, location_id};
use crate::error::RackspaceResult;
use crate::wire::{Page, Plot};

/// Raw points; roll-ups would hide short outages.
const FULL_RESOLUTION: &str = "FULL";

impl RackspaceClient {
    async fn monitoring_url(&self, path: &str) -> String {
        format!("{}/{}", self.session().await.monitoring, path)
    }

    async fn post_check(&self, entity_id: &str, check: &NewCheck) -> RackspaceResult<Check> {
        let url = self.monitoring_url(&format!("entities/{entity_id}/checks")).await;
        let response = self.transport().await.post_json(&url, check).await?;
        let id = location_id(&response, "create check")?;
        Ok(Check {
            id,
            label: Some(check.label.clone()),
            check_type: check.check_type.clone(),
            target_alias: Some(check.target_alias.clone()),
        })
    }

    async fn entity_page(&self, marker: Option<&str>) -> RackspaceResult<EntityPage> {
        let url = self.monitoring_url("entities").await;
        let mut query = vec![("limit", PAGE_LIMIT.to_string())];
        if let Some(marker) = marker {
            query.push(("marker", marker.to_string()));
        }
        let page: Page<Entity> = self.transport().await.get_json(&url, &query).await?;
        Ok(EntityPage {
            entities: page.values,
            next_marker: page.metadata.next_marker.filter(|m| !m.is_empty()),
        })
    }

    async fn plot(
        &self,
        entity_id: &str,
        check_id: &str,
        metric: &str,
        window: &AvailabilityWindow,
    ) -> RackspaceResult<Vec<DataPoint>> {
        let url = self
            .monitoring_url(&format!(
                "entities/{entity_id}/checks/{check_id}/metrics/{metric}/plot"
            ))
            .await;
        let query = [
            ("from", window.start_millis().to_string()),
            ("to", window.end_millis().to_string()),
            ("resolution", FULL_RESOLUTION.to_string()),
        ];
        let plot: Plot = self.transport().await.get_json(&url, &query).await?;
        Ok(plot.values)
    }
}

#[async_trait]
impl Monitoring for RackspaceClient {
    async fn list_entities(&self, marker: Option<&str>) -> PingwatchResult<EntityPage> {
        self.entity_page(marker)
            .await
            .map_err(|e| e.at(Stage::ListEntities))
    }

    async fn list_checks(&self, entity_id: &str) -> PingwatchResult<Vec<Check>> {
        let url = self.monitoring_url(&format!("entities/{entity_id}/checks")).await;
        self.transport()
            .await
            .list_all(&url)
            .await
            .map_err(|e| e.at(Stage::ListChecks))
    }

    async fn create_check(&self, entity_id: &str, check: &NewCheck) -> PingwatchResult<Check> {
        self.post_check(entity_id, check)
            .await
            .map_err(|e| e.at(Stage::CreateCheck))
    }

    async fn list_metrics(&self, entity_id: &str, check_id: &str) -> PingwatchResult<Vec<Metric>> {
        let url = self
            .monitoring_url(&format!("entities/{entity_id}/checks/{check_id}/metrics"))
            .await;
        self.transport()
            .await
            .list_all(&url)
            .await
            .map_err(|e| e.at(Stage::ListMetrics))
    }

    async fn fetch_points(
        &self,
        entity_id: &str,
        check_id: &str,
        metric: &str,
        window: &AvailabilityWindow,
    ) -> PingwatchResult<Vec<DataPoint>> {
        self.plot(entity_id, check_id, metric, window)
            .await
            .map_err(|e| e.at(Stage::FetchPoints))
    }

    async fn list_notification_plans(&self) -> PingwatchResult<Vec<NotificationPlan>> {
        let url = self.monitoring_url("notification_plans").await;
        self.transport()
            .await
            .list_all(&url)
            .await
            .map_err(|e| e.at(Stage::ListNotificationPlans))
    }

    async fn create_alarm(&self, entity_id: &str, alarm: &NewAlarm) -> PingwatchResult<()> {
        let url = self.monitoring_url(&format!("entities/{entity_id}/alarms")).await;
        self.transport()
            .await
            .post_json(&url, alarm)
            .await
            .map(|_| ())
            .map_err(|e| e.at(Stage::CreateAlarm))
    }
}
