//! Fleet monitor: periodic per-host observation into the shared cache.
//!
//! Each pass walks the roster in order. A host that cannot be checked is
//! recorded as offline and the pass moves on; nothing here stops the loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::process::{Liveness, ProcessController};
use super::stats::parse_stats;
use super::types::{FleetStatusEntry, LifecycleState};
use super::vpn::VpnController;
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::remote::{shell_quote, RemoteChannel};

/// Latest observation per host. Every access goes through the lock.
#[derive(Default)]
pub struct StatusCache {
    entries: RwLock<HashMap<String, FleetStatusEntry>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the host's entry wholesale.
    pub async fn put(&self, host: &str, entry: FleetStatusEntry) {
        self.entries.write().await.insert(host.to_string(), entry);
    }

    pub async fn get(&self, host: &str) -> Option<FleetStatusEntry> {
        self.entries.read().await.get(host).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, FleetStatusEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub running: usize,
    pub stopped: usize,
    pub offline: usize,
}

pub struct FleetMonitor<C> {
    channel: Arc<C>,
    process: Arc<ProcessController<C>>,
    vpn: Arc<VpnController<C>>,
    cache: Arc<StatusCache>,
    hosts: Vec<String>,
    log_path: String,
    config: MonitorConfig,
}

impl<C: RemoteChannel> FleetMonitor<C> {
    pub fn new(
        channel: Arc<C>,
        process: Arc<ProcessController<C>>,
        vpn: Arc<VpnController<C>>,
        cache: Arc<StatusCache>,
        hosts: Vec<String>,
        log_path: String,
        config: MonitorConfig,
    ) -> Self {
        Self {
            channel,
            process,
            vpn,
            cache,
            hosts,
            log_path,
            config,
        }
    }

    /// Observe one host and store the result. Failures become `offline`.
    pub async fn check_host(&self, host: &str) -> FleetStatusEntry {
        let entry = match self.observe(host).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(host = %host, error = %e, "host check failed, marking offline");
                FleetStatusEntry::offline(e.to_string())
            }
        };
        self.cache.put(host, entry.clone()).await;
        entry
    }

    async fn observe(&self, host: &str) -> Result<FleetStatusEntry> {
        match self.process.check_liveness(host).await? {
            Liveness::Running => {
                let tail = self
                    .channel
                    .execute(
                        host,
                        &format!(
                            "tail -n {} {}",
                            self.config.log_tail_lines,
                            shell_quote(&self.log_path)
                        ),
                        Duration::from_secs(self.config.tail_timeout_secs),
                    )
                    .await?;
                let stats = parse_stats(&tail.stdout);
                let vpn = self.vpn.query_status(host).await?;
                Ok(FleetStatusEntry::running(stats, vpn))
            }
            Liveness::Stopped => {
                let vpn = self.vpn.query_status(host).await?;
                Ok(FleetStatusEntry::stopped(vpn))
            }
        }
    }

    /// Check every host once, sequentially.
    pub async fn run_pass(&self) -> PassSummary {
        let mut summary = PassSummary::default();
        for host in &self.hosts {
            match self.check_host(host).await.state {
                LifecycleState::Running => summary.running += 1,
                LifecycleState::Stopped => summary.stopped += 1,
                LifecycleState::Offline => summary.offline += 1,
            }
        }
        debug!(
            running = summary.running,
            stopped = summary.stopped,
            offline = summary.offline,
            "monitor pass completed"
        );
        summary
    }

    /// Run passes forever, the first one immediately.
    pub async fn run_loop(self: Arc<Self>) {
        info!(
            interval_secs = self.config.interval_secs,
            hosts = self.hosts.len(),
            "starting fleet monitor"
        );
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.run_pass().await;
        }
    }
}
