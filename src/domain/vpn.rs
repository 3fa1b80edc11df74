//! VPN egress rotation, driven through the remote VPN client's CLI.
//!
//! `Connected(loc) → disconnect → Disconnected → set location →
//! Disconnected(new) → connect → Connected(new)?`
//!
//! The client's status output is untyped text. All interpretation of it lives
//! in [`VpnStatus::parse`]; success of a rotation or reconnect is decided only
//! by the status read after the last step.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use rand::seq::IndexedRandom;
use regex::Regex;
use tracing::{debug, info, warn};

use super::types::VpnStatus;
use crate::config::VpnConfig;
use crate::error::{FleetError, Result};
use crate::remote::{shell_quote, RemoteChannel};

/// Substring the client prints when the tunnel is up.
pub const CONNECTED_MARKER: &str = "Connected";

static LOCATION_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"to ([a-z]{2}-[a-z]{3})").expect("valid regex"));

impl VpnStatus {
    /// Classify the client's status output.
    pub fn parse(output: &str) -> Self {
        let raw_status = output.trim().to_string();
        if !raw_status.contains(CONNECTED_MARKER) {
            return Self {
                connected: false,
                location: None,
                raw_status,
            };
        }

        let location = LOCATION_CODE
            .captures(&raw_status)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            connected: true,
            location: Some(location),
            raw_status,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Readiness {
    Connected,
    Disconnected,
}

impl Readiness {
    fn reached(self, status: &VpnStatus) -> bool {
        match self {
            Self::Connected => status.connected,
            Self::Disconnected => !status.connected,
        }
    }
}

pub struct VpnController<C> {
    channel: Arc<C>,
    config: VpnConfig,
}

impl<C: RemoteChannel> VpnController<C> {
    pub fn new(channel: Arc<C>, config: VpnConfig) -> Self {
        Self { channel, config }
    }

    pub fn catalog(&self) -> &[String] {
        &self.config.catalog
    }

    /// Uniform pick from the location catalog.
    pub fn random_location(&self) -> String {
        self.config
            .catalog
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| "us-nyc".to_string())
    }

    /// Run the status command and classify its output.
    pub async fn query_status(&self, host: &str) -> Result<VpnStatus> {
        let out = self
            .channel
            .execute(
                host,
                &format!("{} status", self.config.client),
                self.config.command_timeout(),
            )
            .await?;
        let text = if out.has_stdout() {
            out.stdout
        } else {
            out.stderr
        };
        Ok(VpnStatus::parse(&text))
    }

    /// Move the host's egress to `location`, or to a random catalog entry.
    ///
    /// Every step runs regardless of how the previous one went. The outcome is
    /// the final status read: `Ok` iff it shows the tunnel connected.
    pub async fn rotate_to_location(&self, host: &str, location: Option<&str>) -> Result<String> {
        let location = match location {
            Some(loc) => loc.to_string(),
            None => self.random_location(),
        };
        info!(host = %host, location = %location, "rotating VPN location");

        self.disconnect(host).await;
        self.settle(host, Readiness::Disconnected, self.config.disconnect_settle_ms)
            .await;

        let set_error = self.set_location(host, &location).await;
        if let Some(err) = &set_error {
            warn!(
                host = %host,
                location = %location,
                error = %err,
                "set-location step failed, continuing to verification"
            );
        }
        // The status text does not reflect relay selection, so this one is a
        // plain wait.
        tokio::time::sleep(Duration::from_millis(self.config.set_location_settle_ms)).await;

        self.connect(host).await;
        self.settle(host, Readiness::Connected, self.config.connect_settle_ms)
            .await;

        let status = self.query_status(host).await?;
        if status.connected {
            info!(host = %host, location = %location, "VPN rotated");
            Ok(format!("connected to {}", location))
        } else {
            let mut reason = format!("VPN not connected after switching to {}: {}", location, status.raw_status);
            if let Some(err) = set_error {
                reason.push_str(&format!(" (set location failed: {})", err));
            }
            Err(FleetError::command(host, reason))
        }
    }

    /// Drop and re-establish the tunnel without changing location.
    pub async fn reconnect(&self, host: &str) -> Result<String> {
        info!(host = %host, "reconnecting VPN");

        self.disconnect(host).await;
        self.settle(host, Readiness::Disconnected, self.config.disconnect_settle_ms)
            .await;
        self.connect(host).await;
        self.settle(host, Readiness::Connected, self.config.connect_settle_ms)
            .await;

        let status = self.query_status(host).await?;
        if status.connected {
            info!(host = %host, location = ?status.location, "VPN reconnected");
            Ok("VPN reconnected".to_string())
        } else {
            Err(FleetError::command(
                host,
                format!("VPN reconnect failed: {}", status.raw_status),
            ))
        }
    }

    async fn disconnect(&self, host: &str) {
        let command = format!("{} disconnect", self.config.client);
        if let Err(e) = self
            .channel
            .execute(host, &command, self.config.command_timeout())
            .await
        {
            debug!(host = %host, error = %e, "VPN disconnect failed");
        }
    }

    async fn connect(&self, host: &str) {
        let command = format!("{} connect", self.config.client);
        if let Err(e) = self
            .channel
            .execute(host, &command, self.config.connect_timeout())
            .await
        {
            debug!(host = %host, error = %e, "VPN connect failed");
        }
    }

    /// Returns the step's error text, if any.
    async fn set_location(&self, host: &str, location: &str) -> Option<String> {
        let command = format!(
            "{} relay set location {}",
            self.config.client,
            shell_quote(location)
        );
        match self
            .channel
            .execute(host, &command, self.config.command_timeout())
            .await
        {
            Ok(out) if !out.stderr.trim().is_empty() => Some(out.stderr.trim().to_string()),
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        }
    }

    /// Poll the status until `until` holds, for at most `budget_ms`.
    ///
    /// Never decides the outcome; it only shortens the wait when the client
    /// converges early.
    async fn settle(&self, host: &str, until: Readiness, budget_ms: u64) {
        let poll = async {
            loop {
                match self.query_status(host).await {
                    Ok(status) if until.reached(&status) => {
                        debug!(host = %host, state = ?until, "VPN client settled");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => debug!(host = %host, error = %e, "status poll failed while settling"),
                }
                tokio::time::sleep(self.config.poll_interval()).await;
            }
        };

        if tokio::time::timeout(Duration::from_millis(budget_ms), poll)
            .await
            .is_err()
        {
            debug!(host = %host, state = ?until, budget_ms, "VPN settle budget exhausted");
        }
    }
}
