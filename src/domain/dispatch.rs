//! Named actions accepted from callers, and per-host result aggregation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::types::{ActionResponse, HostOutcome};
use crate::error::FleetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Deploy,
    StartAll,
    StopAll,
    StartOne,
    StopOne,
    VpnReconnectAll,
    VpnRandomAll,
    VpnReconnectOne,
    VpnRandomOne,
}

impl Action {
    pub fn is_fleet_wide(self) -> bool {
        matches!(
            self,
            Self::Deploy | Self::StartAll | Self::StopAll | Self::VpnReconnectAll | Self::VpnRandomAll
        )
    }

    /// First line of an aggregated fleet-wide message.
    pub fn heading(self) -> &'static str {
        match self {
            Self::Deploy => "Deployment finished",
            Self::StartAll | Self::StartOne => "Start on all hosts",
            Self::StopAll | Self::StopOne => "Stop on all hosts",
            Self::VpnReconnectAll | Self::VpnReconnectOne => "VPN reconnect finished",
            Self::VpnRandomAll | Self::VpnRandomOne => "VPN location change finished",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Deploy => "deploy",
            Self::StartAll => "start_all",
            Self::StopAll => "stop_all",
            Self::StartOne => "start_one",
            Self::StopOne => "stop_one",
            Self::VpnReconnectAll => "vpn_reconnect_all",
            Self::VpnRandomAll => "vpn_random_all",
            Self::VpnReconnectOne => "vpn_reconnect_one",
            Self::VpnRandomOne => "vpn_random_one",
        };
        f.write_str(name)
    }
}

impl FromStr for Action {
    type Err = FleetError;

    /// Accepts snake_case, camelCase and the legacy dashboard names
    /// (`start`, `stop`, `mullvad_*`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        if key.trim().is_empty() {
            return Err(FleetError::Precondition("missing action".to_string()));
        }
        let action = match key.as_str() {
            "deploy" => Self::Deploy,
            "startall" => Self::StartAll,
            "stopall" => Self::StopAll,
            "startone" | "start" => Self::StartOne,
            "stopone" | "stop" => Self::StopOne,
            "vpnreconnectall" | "mullvadreconnectall" => Self::VpnReconnectAll,
            "vpnrandomall" | "mullvadrandomall" => Self::VpnRandomAll,
            "vpnreconnectone" | "vpnreconnect" | "mullvadreconnect" => Self::VpnReconnectOne,
            "vpnrandomone" | "vpnrandom" | "mullvadrandom" => Self::VpnRandomOne,
            _ => return Err(FleetError::Precondition(format!("invalid action: {}", s))),
        };
        Ok(action)
    }
}

fn default_viewers() -> u32 {
    100
}

/// Form posts send numbers as strings; accept both. A blank string means
/// the default.
fn viewers_from_number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) if text.trim().is_empty() => Ok(default_viewers()),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid viewer count: {:?}", text))),
    }
}

/// Body of an action request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default, alias = "vm_ip", alias = "targetHost")]
    pub host: Option<String>,
    #[serde(default)]
    pub channel: String,
    #[serde(
        default = "default_viewers",
        alias = "viewerCount",
        deserialize_with = "viewers_from_number_or_string"
    )]
    pub viewers: u32,
    /// Explicit VPN location for the `vpn_random_*` actions.
    #[serde(default)]
    pub location: Option<String>,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            host: None,
            channel: String::new(),
            viewers: default_viewers(),
            location: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

impl HostOutcome {
    pub fn from_result(host: &str, result: Result<String, FleetError>) -> Self {
        match result {
            Ok(message) => Self {
                host: host.to_string(),
                success: true,
                message,
            },
            Err(e) => Self {
                host: host.to_string(),
                success: false,
                message: e.to_string(),
            },
        }
    }
}

impl ActionResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            results: Vec::new(),
        }
    }

    pub fn single(outcome: HostOutcome) -> Self {
        Self {
            success: outcome.success,
            message: outcome.message.clone(),
            results: vec![outcome],
        }
    }

    /// `success` only when every host succeeded; the message lists every
    /// host's outcome under `heading`.
    pub fn aggregate(heading: &str, results: Vec<HostOutcome>) -> Self {
        let mut message = heading.to_string();
        for outcome in &results {
            message.push('\n');
            message.push_str(&format!("{}: {}", outcome.host, outcome.message));
        }
        Self {
            success: results.iter().all(|o| o.success),
            message,
            results,
        }
    }
}
