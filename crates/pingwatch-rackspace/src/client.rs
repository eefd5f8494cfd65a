//! Authenticated HTTP access to the Rackspace APIs.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{RackspaceError, RackspaceResult};
use crate::identity::{self, Credentials, Session};
use crate::wire::Page;

const USER_AGENT: &str = "pingwatch/0.1";

/// Page size requested from paginated list endpoints.
pub(crate) const PAGE_LIMIT: u32 = 100;

/// Client for one account: holds the credentials and the current session.
pub struct RackspaceClient {
    http: reqwest::Client,
    auth_url: String,
    credentials: Credentials,
    session: RwLock<Arc<Session>>,
}

impl RackspaceClient {
    /// Authenticate and build a client. `request_timeout` bounds every
    /// HTTP request the client makes.
    pub async fn connect(
        auth_url: &str,
        credentials: Credentials,
        request_timeout: Duration,
    ) -> RackspaceResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;
        let session = identity::authenticate(&http, auth_url, &credentials).await?;

        Ok(Self {
            http,
            auth_url: auth_url.to_string(),
            credentials,
            session: RwLock::new(Arc::new(session)),
        })
    }

    /// Re-authenticate, replacing the token and service catalog.
    pub async fn refresh(&self) -> RackspaceResult<Arc<Session>> {
        let session = Arc::new(
            identity::authenticate(&self.http, &self.auth_url, &self.credentials).await?,
        );
        *self.session.write().await = session.clone();
        Ok(session)
    }

    pub async fn session(&self) -> Arc<Session> {
        self.session.read().await.clone()
    }

    pub(crate) async fn transport(&self) -> Transport {
        Transport {
            http: self.http.clone(),
            token: self.session().await.token.clone(),
        }
    }
}

/// An HTTP client bound to one token.
#[derive(Clone)]
pub(crate) struct Transport {
    http: reqwest::Client,
    token: String,
}

impl Transport {
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> RackspaceResult<T> {
        debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .header("X-Auth-Token", &self.token)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;
        let response = check_status("GET", url, response).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> RackspaceResult<reqwest::Response> {
        debug!(%url, "POST");
        let response = self
            .http
            .post(url)
            .header("X-Auth-Token", &self.token)
            .json(body)
            .send()
            .await?;
        check_status("POST", url, response).await
    }

    /// Every value of a monitoring list endpoint, following `next_marker`.
    pub async fn list_all<T: DeserializeOwned>(&self, url: &str) -> RackspaceResult<Vec<T>> {
        let mut values = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut query = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(marker) = &marker {
                query.push(("marker", marker.clone()));
            }

            let page: Page<T> = self.get_json(url, &query).await?;
            values.extend(page.values);

            match page.metadata.next_marker {
                Some(next) if !next.is_empty() && marker.as_deref() != Some(next.as_str()) => {
                    marker = Some(next);
                }
                _ => break,
            }
        }
        Ok(values)
    }
}

/// Turn a non-2xx response into [`RackspaceError::Status`].
pub(crate) async fn check_status(
    method: &'static str,
    url: &str,
    response: reqwest::Response,
) -> RackspaceResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RackspaceError::Status {
        method,
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// The id of a created resource: the last segment of its Location header.
pub(crate) fn location_id(response: &reqwest::Response, what: &str) -> RackspaceResult<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RackspaceError::MissingLocation(what.to_string()))
}
