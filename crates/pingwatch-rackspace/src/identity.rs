//! Identity (Keystone v2) authentication and the service catalog.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{RackspaceError, RackspaceResult};

pub const DEFAULT_AUTH_URL: &str = "https://identity.api.rackspacecloud.com/v2.0";

const COMPUTE_SERVICE_TYPE: &str = "compute";
const MONITORING_SERVICE_TYPE: &str = "rax:monitor";

/// Account credentials.
#[derive(Clone)]
pub enum Credentials {
    Password { username: String, password: String },
    ApiKey { username: String, api_key: String },
}

impl Credentials {
    pub fn username(&self) -> &str {
        match self {
            Credentials::Password { username, .. } | Credentials::ApiKey { username, .. } => {
                username
            }
        }
    }

    pub(crate) fn auth_body(&self) -> serde_json::Value {
        match self {
            Credentials::Password { username, password } => json!({
                "auth": {
                    "passwordCredentials": { "username": username, "password": password }
                }
            }),
            Credentials::ApiKey { username, api_key } => json!({
                "auth": {
                    "RAX-KSKEY:apiKeyCredentials": { "username": username, "apiKey": api_key }
                }
            }),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Credentials::Password { .. } => "Password",
            Credentials::ApiKey { .. } => "ApiKey",
        };
        f.debug_struct(kind)
            .field("username", &self.username())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A token plus the endpoints the service catalog handed out with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    /// Region → compute endpoint.
    pub compute: BTreeMap<String, String>,
    pub monitoring: String,
}

impl Session {
    /// Region names with a compute endpoint, in a stable order.
    pub fn regions(&self) -> Vec<String> {
        self.compute.keys().cloned().collect()
    }

    pub fn compute_endpoint(&self, region: &str) -> RackspaceResult<&str> {
        self.compute
            .get(region)
            .map(String::as_str)
            .ok_or_else(|| RackspaceError::UnknownRegion(region.to_string()))
    }

    pub(crate) fn from_access(response: AccessResponse) -> RackspaceResult<Self> {
        let access = response.access;

        let compute: BTreeMap<String, String> = access
            .service_catalog
            .iter()
            .filter(|s| s.service_type == COMPUTE_SERVICE_TYPE)
            .flat_map(|s| s.endpoints.iter())
            .filter_map(|e| {
                let region = e.region.as_ref()?;
                Some((region.clone(), trim_slash(&e.public_url)))
            })
            .collect();
        if compute.is_empty() {
            warn!("service catalog lists no regional compute endpoint");
        }

        let monitoring = access
            .service_catalog
            .iter()
            .filter(|s| s.service_type == MONITORING_SERVICE_TYPE)
            .flat_map(|s| s.endpoints.iter())
            .map(|e| trim_slash(&e.public_url))
            .next()
            .ok_or(RackspaceError::MissingService(MONITORING_SERVICE_TYPE))?;

        Ok(Self {
            token: access.token.id,
            compute,
            monitoring,
        })
    }
}

fn trim_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccessResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<Service>,
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Service {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}

/// Exchange credentials for a token and service catalog.
pub async fn authenticate(
    http: &reqwest::Client,
    auth_url: &str,
    credentials: &Credentials,
) -> RackspaceResult<Session> {
    let url = format!("{}/tokens", auth_url.trim_end_matches('/'));
    let response = http.post(&url).json(&credentials.auth_body()).send().await?;
    let response = crate::client::check_status("POST", &url, response).await?;
    let access: AccessResponse = response.json().await?;

    let session = Session::from_access(access)?;
    debug!(
        user = %credentials.username(),
        regions = ?session.regions(),
        "authenticated"
    );
    Ok(session)
}
