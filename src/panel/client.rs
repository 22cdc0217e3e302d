//! HTTP client for the panel.
//!
//! # Responsibilities
//! - Fetch the server configuration once per reload cycle
//! - Map transport, status and decoding failures to `ControlPlaneError`
//!
//! No retry happens here: a failed fetch fails the whole cycle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;

use crate::config::ApiConfig;
use crate::panel::types::{ConfigSnapshot, ControlPlaneError, ServerConfigResponse};

const SERVER_CONFIG_PATH: &str = "api/v2/server/config";

/// Source of configuration snapshots.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch the current snapshot for the node described by `api`.
    async fn fetch_snapshot(&self, api: &ApiConfig) -> Result<ConfigSnapshot, ControlPlaneError>;
}

/// Panel client over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpControlPlane {
    client: reqwest::Client,
}

impl HttpControlPlane {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(api: &ApiConfig) -> Result<url::Url, ControlPlaneError> {
        let mut base = api.api_host.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let mut url = url::Url::parse(&base)
            .and_then(|u| u.join(SERVER_CONFIG_PATH))
            .map_err(|_| ControlPlaneError::InvalidUrl(api.api_host.clone()))?;
        url.query_pairs_mut()
            .append_pair("server_id", &api.server_id.to_string());
        Ok(url)
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn fetch_snapshot(&self, api: &ApiConfig) -> Result<ConfigSnapshot, ControlPlaneError> {
        let url = Self::endpoint(api)?;
        tracing::debug!(url = %url, server_id = api.server_id, "Fetching server configuration");

        let res = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", api.secret_key))
            .timeout(Duration::from_secs(api.timeout_secs))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ControlPlaneError::Status(status.as_u16()));
        }

        let body: ServerConfigResponse = res.json().await?;
        let snapshot = ConfigSnapshot::try_from(body)?;

        tracing::info!(
            server_id = snapshot.server_id,
            total = snapshot.total,
            "Server configuration fetched"
        );
        Ok(snapshot)
    }
}
