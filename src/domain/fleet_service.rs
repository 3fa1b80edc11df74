//! Fleet service: the single entry point the API layers talk to.
//!
//! Actions run per host, one host at a time; each host's outcome is captured
//! on its own. Status reads come only from the monitor's cache and never
//! trigger remote calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::deploy::Deployer;
use super::dispatch::{Action, ActionRequest};
use super::monitor::{FleetMonitor, StatusCache};
use super::process::{ProcessController, StartParams};
use super::types::*;
use super::vpn::VpnController;
use crate::config::Config;
use crate::error::{FleetError, Result};
use crate::remote::{shell_quote, RemoteChannel};

pub struct FleetService<C> {
    config: Config,
    channel: Arc<C>,
    deployer: Deployer<C>,
    vpn: Arc<VpnController<C>>,
    process: Arc<ProcessController<C>>,
    monitor: Arc<FleetMonitor<C>>,
    cache: Arc<StatusCache>,
    start_time: Instant,
}

impl<C: RemoteChannel> FleetService<C> {
    pub fn new(config: Config, channel: C) -> Arc<Self> {
        let channel = Arc::new(channel);
        let command_timeout = Duration::from_secs(config.ssh.command_timeout_secs);

        let deployer = Deployer::new(
            channel.clone(),
            config.remote.clone(),
            config.payload.clone(),
            config.bootstrap.clone(),
            command_timeout,
        );
        let vpn = Arc::new(VpnController::new(channel.clone(), config.vpn.clone()));
        let process = Arc::new(ProcessController::new(
            channel.clone(),
            config.remote.clone(),
            config.process.clone(),
            command_timeout,
        ));
        let cache = Arc::new(StatusCache::new());
        let monitor = Arc::new(FleetMonitor::new(
            channel.clone(),
            process.clone(),
            vpn.clone(),
            cache.clone(),
            config.hosts.clone(),
            config.remote.log_path(),
            config.monitor.clone(),
        ));

        Arc::new(Self {
            config,
            channel,
            deployer,
            vpn,
            process,
            monitor,
            cache,
            start_time: Instant::now(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn hosts(&self) -> &[String] {
        &self.config.hosts
    }

    pub fn is_known_host(&self, host: &str) -> bool {
        self.config.hosts.iter().any(|h| h == host)
    }

    pub fn monitor(&self) -> Arc<FleetMonitor<C>> {
        self.monitor.clone()
    }

    pub fn vpn(&self) -> &VpnController<C> {
        &self.vpn
    }

    pub fn process(&self) -> &ProcessController<C> {
        &self.process
    }

    pub fn deployer(&self) -> &Deployer<C> {
        &self.deployer
    }

    /// Map a named action onto core operations and collect per-host results.
    pub async fn perform_action(&self, request: &ActionRequest) -> ActionResponse {
        let action = match request.action.parse::<Action>() {
            Ok(action) => action,
            Err(e) => {
                warn!(action = %request.action, "rejected invalid action");
                return ActionResponse::failure(e.to_string());
            }
        };
        info!(
            action = %action,
            host = ?request.host,
            channel = %request.channel,
            viewers = request.viewers,
            "performing action"
        );

        if action.is_fleet_wide() {
            let mut results = Vec::with_capacity(self.config.hosts.len());
            for host in &self.config.hosts {
                let outcome = self.run_on_host(action, host, request).await;
                log_outcome(action, &outcome);
                results.push(outcome);
            }
            return ActionResponse::aggregate(action.heading(), results);
        }

        let host = match request.host.as_deref() {
            None => {
                return ActionResponse::failure(format!("action {} requires a target host", action));
            }
            Some(host) if !self.is_known_host(host) => {
                return ActionResponse::failure(format!("unknown host: {}", host));
            }
            Some(host) => host,
        };
        let outcome = self.run_on_host(action, host, request).await;
        log_outcome(action, &outcome);
        ActionResponse::single(outcome)
    }

    async fn run_on_host(&self, action: Action, host: &str, request: &ActionRequest) -> HostOutcome {
        let params = StartParams {
            channel: request.channel.clone(),
            viewer_count: request.viewers,
        };
        let result = match action {
            Action::Deploy => self.deployer.deploy(host).await,
            Action::StartAll | Action::StartOne => self.process.start(host, &params).await,
            Action::StopAll | Action::StopOne => self.process.stop(host).await,
            Action::VpnReconnectAll | Action::VpnReconnectOne => self.vpn.reconnect(host).await,
            Action::VpnRandomAll | Action::VpnRandomOne => {
                self.vpn
                    .rotate_to_location(host, request.location.as_deref())
                    .await
            }
        };
        HostOutcome::from_result(host, result)
    }

    /// Every configured host in roster order; never-observed hosts are
    /// reported as `unknown`.
    pub async fn fleet_status(&self) -> FleetStatus {
        let entries = self.cache.snapshot().await;
        FleetStatus {
            hosts: self
                .config
                .hosts
                .iter()
                .map(|host| HostStatus::from_entry(host, entries.get(host).cloned()))
                .collect(),
        }
    }

    /// Run the monitor's per-host check now and return the fresh status.
    pub async fn check_host(&self, host: &str) -> Result<HostStatus> {
        if !self.is_known_host(host) {
            return Err(FleetError::Precondition(format!("unknown host: {}", host)));
        }
        let entry = self.monitor.check_host(host).await;
        Ok(HostStatus::from_entry(host, Some(entry)))
    }

    /// Tail of the payload log. Unknown hosts are rejected locally.
    pub async fn logs(&self, host: &str) -> LogsResponse {
        if !self.is_known_host(host) {
            return LogsResponse {
                logs: Vec::new(),
                error: Some(format!("unknown host: {}", host)),
            };
        }

        let command = format!(
            "tail -n {} {}",
            self.config.daemon.logs_tail_lines,
            shell_quote(&self.config.remote.log_path())
        );
        let timeout = Duration::from_secs(self.config.ssh.command_timeout_secs);
        match self.channel.execute(host, &command, timeout).await {
            Ok(out) if out.has_stdout() => LogsResponse {
                logs: out.stdout.trim().lines().map(String::from).collect(),
                error: None,
            },
            Ok(out) => LogsResponse {
                logs: Vec::new(),
                error: Some(out.stderr.trim().to_string()).filter(|e| !e.is_empty()),
            },
            Err(e) => LogsResponse {
                logs: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn health(&self) -> DaemonHealth {
        DaemonHealth {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            host_count: self.config.hosts.len() as u32,
            observed_hosts: self.cache.len().await as u32,
        }
    }
}

fn log_outcome(action: Action, outcome: &HostOutcome) {
    if outcome.success {
        info!(action = %action, host = %outcome.host, message = %outcome.message, "action succeeded");
    } else {
        warn!(action = %action, host = %outcome.host, message = %outcome.message, "action failed");
    }
}
