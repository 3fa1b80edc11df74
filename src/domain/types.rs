use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Observed state of the managed process on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Running,
    Stopped,
    Offline,
}

/// What readers see for a host: a cached lifecycle state, or `Unknown` when
/// no check has completed for it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Running,
    Stopped,
    Offline,
    Unknown,
}

impl From<LifecycleState> for HostState {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Running => Self::Running,
            LifecycleState::Stopped => Self::Stopped,
            LifecycleState::Offline => Self::Offline,
        }
    }
}

/// Counters scraped from the payload's log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct StatsSnapshot {
    pub connections: u64,
    pub viewers: u64,
    pub pings: u64,
    pub heartbeats: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct VpnStatus {
    pub connected: bool,
    pub location: Option<String>,
    /// Trimmed output of the VPN client's status command.
    pub raw_status: String,
}

/// One host's cached observation. Replaced wholesale on every check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct FleetStatusEntry {
    pub state: LifecycleState,
    pub stats: Option<StatsSnapshot>,
    pub vpn: Option<VpnStatus>,
    pub observed_at: DateTime<Utc>,
    /// Why the host was classified offline.
    pub error: Option<String>,
}

impl FleetStatusEntry {
    pub fn running(stats: Option<StatsSnapshot>, vpn: VpnStatus) -> Self {
        Self {
            state: LifecycleState::Running,
            stats,
            vpn: Some(vpn),
            observed_at: Utc::now(),
            error: None,
        }
    }

    pub fn stopped(vpn: VpnStatus) -> Self {
        Self {
            state: LifecycleState::Stopped,
            stats: None,
            vpn: Some(vpn),
            observed_at: Utc::now(),
            error: None,
        }
    }

    pub fn offline(error: impl Into<String>) -> Self {
        Self {
            state: LifecycleState::Offline,
            stats: None,
            vpn: None,
            observed_at: Utc::now(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct HostStatus {
    pub host: String,
    pub state: HostState,
    pub stats: Option<StatsSnapshot>,
    pub vpn: Option<VpnStatus>,
    pub observed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl HostStatus {
    pub fn from_entry(host: &str, entry: Option<FleetStatusEntry>) -> Self {
        match entry {
            Some(entry) => Self {
                host: host.to_string(),
                state: entry.state.into(),
                stats: entry.stats,
                vpn: entry.vpn,
                observed_at: Some(entry.observed_at),
                error: entry.error,
            },
            None => Self {
                host: host.to_string(),
                state: HostState::Unknown,
                stats: None,
                vpn: None,
                observed_at: None,
                error: None,
            },
        }
    }
}

/// Every configured host, in roster order.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct FleetStatus {
    pub hosts: Vec<HostStatus>,
}

impl FleetStatus {
    pub fn get(&self, host: &str) -> Option<&HostStatus> {
        self.hosts.iter().find(|h| h.host == host)
    }
}

/// Host-keyed view of a [`FleetStatus`] for the dashboard's `/status` path:
/// `{"<host>": {host, state, stats, vpn, ...}}`, keys in roster order.
#[derive(Debug, Clone)]
pub struct FleetStatusByHost(pub FleetStatus);

impl Serialize for FleetStatusByHost {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.hosts.iter().map(|h| (&h.host, h)))
    }
}

/// Result of one operation against one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct HostOutcome {
    pub host: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub results: Vec<HostOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct LogsResponse {
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct DaemonHealth {
    pub version: String,
    pub uptime_secs: u64,
    pub host_count: u32,
    pub observed_hosts: u32,
}
