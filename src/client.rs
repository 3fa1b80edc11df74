//! Typed HTTP client for the fleetward daemon REST API.

use anyhow::{bail, Context, Result};
use reqwest::Client;

use crate::domain::dispatch::ActionRequest;
use crate::domain::types::{ActionResponse, DaemonHealth, FleetStatus, HostStatus, LogsResponse};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

pub struct FleetClient {
    base_url: String,
    http: Client,
}

impl FleetClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Actions run synchronously on the daemon and can take minutes
    /// (deploys scale with host count), so they get their own client.
    fn action_client(&self) -> Result<Client> {
        Client::builder()
            .build()
            .context("building HTTP client")
    }

    pub async fn health(&self) -> Result<DaemonHealth> {
        self.get("/health").await
    }

    pub async fn fleet_status(&self) -> Result<FleetStatus> {
        self.get("/api/v1/fleet").await
    }

    pub async fn logs(&self, host: &str) -> Result<LogsResponse> {
        let url = format!("{}/api/v1/hosts/{}/logs", self.base_url, host);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        // 404 still carries a LogsResponse with the error.
        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }

    pub async fn check_host(&self, host: &str) -> Result<HostStatus> {
        self.post_empty(&format!("/api/v1/hosts/{}/check", host)).await
    }

    pub async fn perform_action(&self, request: &ActionRequest) -> Result<ActionResponse> {
        let url = format!("{}/api/v1/actions", self.base_url);
        let resp = self
            .action_client()?
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        if !resp.status().is_success() {
            bail!("{} returned {}", url, resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }

    // ── Internal helpers ───────────────────────────────────

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;

        if !resp.status().is_success() {
            bail!("{} returned {}", url, resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }

    async fn post_empty<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .action_client()?
            .post(&url)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;

        if !resp.status().is_success() {
            bail!("{} returned {}", url, resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }
}
