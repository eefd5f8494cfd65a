//! Cloud servers: listing and rebooting machines in one region.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use pingwatch_core::*;

use crate::client::{PAGE_LIMIT, RackspaceClient, Transport};
use crate::error::RackspaceResult;
use crate::wire::ServersPage;

/// The compute service of one region, bound to the token it was made with.
pub struct RegionCompute {
    transport: Transport,
    endpoint: String,
    region: String,
}

impl RegionCompute {
    async fn servers(&self) -> RackspaceResult<Vec<Machine>> {
        let url = format!("{}/servers/detail", self.endpoint);
        let mut machines = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut query = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(marker) = &marker {
                query.push(("marker", marker.clone()));
            }

            let page: ServersPage = self.transport.get_json(&url, &query).await?;
            let has_next = page.has_next();
            let last = page.servers.last().map(|s| s.id.clone());
            machines.extend(page.servers.into_iter().map(|s| s.into_machine(&self.region)));

            match last {
                Some(last) if has_next => marker = Some(last),
                _ => break,
            }
        }

        debug!(region = %self.region, count = machines.len(), "listed servers");
        Ok(machines)
    }

    async fn soft_reboot(&self, machine: &Machine) -> RackspaceResult<()> {
        let url = format!("{}/servers/{}/action", self.endpoint, machine.id);
        self.transport
            .post_json(&url, &json!({ "reboot": { "type": "SOFT" } }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Compute for RegionCompute {
    async fn list_machines(&self) -> PingwatchResult<Vec<Machine>> {
        self.servers().await.map_err(|e| e.at(Stage::ListMachines))
    }

    async fn reboot(&self, machine: &Machine) -> PingwatchResult<()> {
        self.soft_reboot(machine).await.map_err(|e| e.at(Stage::Reboot))
    }
}

#[async_trait]
impl Catalog for RackspaceClient {
    async fn regions(&self) -> PingwatchResult<Vec<String>> {
        let session = self.refresh().await.map_err(|e| e.at(Stage::Catalog))?;
        Ok(session.regions())
    }
}

#[async_trait]
impl ComputeProvider for RackspaceClient {
    async fn compute(&self, region: &str) -> PingwatchResult<Arc<dyn Compute>> {
        let session = self.session().await;
        let endpoint = session
            .compute_endpoint(region)
            .map_err(|e| e.at(Stage::ListMachines))?
            .to_string();

        Ok(Arc::new(RegionCompute {
            transport: self.transport().await,
            endpoint,
            region: region.to_string(),
        }))
    }
}
