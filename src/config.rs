//! Layered configuration: built-in defaults → YAML file → `FLEETWARD_*` env.
//!
//! Nested keys come from the environment with a double underscore, e.g.
//! `FLEETWARD_DAEMON__HTTP_ADDR=127.0.0.1:5001`.

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Managed hosts, by network address. Order is preserved in every
    /// fleet-wide action and status listing.
    pub hosts: Vec<String>,
    pub ssh: SshConfig,
    pub remote: RemoteConfig,
    pub payload: PayloadConfig,
    pub bootstrap: BootstrapConfig,
    pub vpn: VpnConfig,
    pub process: ProcessConfig,
    pub monitor: MonitorConfig,
    pub daemon: DaemonConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hosts: vec![
                "192.168.1.101".into(),
                "192.168.1.84".into(),
                "192.168.1.4".into(),
                "192.168.1.11".into(),
                "192.168.1.182".into(),
            ],
            ssh: SshConfig::default(),
            remote: RemoteConfig::default(),
            payload: PayloadConfig::default(),
            bootstrap: BootstrapConfig::default(),
            vpn: VpnConfig::default(),
            process: ProcessConfig::default(),
            monitor: MonitorConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

// ── SSH ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub user: String,
    pub port: u16,
    /// Private key used for every host. `None` leaves key selection to the
    /// local ssh client configuration.
    pub identity_file: Option<PathBuf>,
    /// Shared password for every host. When set, sessions go through
    /// `sshpass` with password authentication instead of keys. Prefer
    /// `FLEETWARD_SSH__PASSWORD` over writing it into the file.
    pub password: Option<String>,
    pub connect_timeout_secs: u64,
    /// Default command timeout when an operation does not set its own.
    pub command_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "kali".into(),
            port: 22,
            identity_file: None,
            password: None,
            connect_timeout_secs: 10,
            command_timeout_secs: 30,
        }
    }
}

// ── Remote layout ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub project_dir: String,
    pub payload_name: String,
    pub log_file: String,
    pub venv_dir: String,
    /// `pgrep -f` / `pkill -f` pattern identifying the payload process.
    pub process_pattern: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            project_dir: "/home/kali/Desktop/kick-viewbot-main".into(),
            payload_name: "kick.py".into(),
            log_file: "kick.log".into(),
            venv_dir: "venv".into(),
            process_pattern: "python.*kick.py".into(),
        }
    }
}

impl RemoteConfig {
    pub fn payload_path(&self) -> String {
        format!("{}/{}", self.project_dir, self.payload_name)
    }

    pub fn log_path(&self) -> String {
        format!("{}/{}", self.project_dir, self.log_file)
    }

    pub fn bootstrap_path(&self) -> String {
        format!("{}/ensure_venv.sh", self.project_dir)
    }

    pub fn launcher_path(&self) -> String {
        format!("{}/start_payload.sh", self.project_dir)
    }

    /// Virtual environment directory: `venv_dir` as is when absolute,
    /// otherwise relative to the project directory.
    pub fn venv_path(&self) -> String {
        if self.venv_dir.starts_with('/') {
            self.venv_dir.clone()
        } else {
            format!("{}/{}", self.project_dir, self.venv_dir)
        }
    }
}

// ── Payload + bootstrap ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    pub local_path: PathBuf,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            local_path: PathBuf::from("./kick.py"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Module whose successful import proves the environment is healthy.
    pub probe_module: String,
    pub packages: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            probe_module: "fake_useragent".into(),
            packages: vec![
                "fake_useragent".into(),
                "tls_client".into(),
                "typing_extensions".into(),
                "websockets".into(),
            ],
            timeout_secs: 120,
        }
    }
}

// ── VPN ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VpnConfig {
    /// VPN client binary on the remote host.
    pub client: String,
    pub catalog: Vec<String>,
    pub command_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub disconnect_settle_ms: u64,
    pub set_location_settle_ms: u64,
    pub connect_settle_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            client: "mullvad".into(),
            catalog: [
                "us-nyc", "us-lax", "us-mia", "us-chi", "us-dal", "ca-tor", "gb-lon", "de-fra",
                "de-ber", "fr-par", "nl-ams", "se-sto", "ch-zur", "au-syd", "jp-tyo", "sg-sin",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            command_timeout_secs: 10,
            connect_timeout_secs: 15,
            disconnect_settle_ms: 2000,
            set_location_settle_ms: 1000,
            connect_settle_ms: 3000,
            poll_interval_ms: 500,
        }
    }
}

impl VpnConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ── Process ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub kill_settle_ms: u64,
    pub start_settle_ms: u64,
    pub liveness_timeout_secs: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            kill_settle_ms: 1000,
            start_settle_ms: 2000,
            liveness_timeout_secs: 5,
        }
    }
}

// ── Monitor ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub log_tail_lines: u32,
    pub tail_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            log_tail_lines: 20,
            tail_timeout_secs: 5,
        }
    }
}

// ── Daemon ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub http_addr: String,
    pub log_level: String,
    /// Lines returned by the logs endpoint.
    pub logs_tail_lines: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:5000".into(),
            log_level: "info".into(),
            logs_tail_lines: 100,
        }
    }
}

impl Config {
    /// Default config file location: `~/.config/fleetward/fleet.yaml`.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("fleetward").join("fleet.yaml"))
    }

    /// Reject configurations no operation could run against.
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            bail!("no hosts configured");
        }
        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.trim().is_empty() {
                bail!("empty host entry in roster");
            }
            if !seen.insert(host.as_str()) {
                bail!("host {} listed more than once", host);
            }
        }
        if self.monitor.interval_secs == 0 {
            bail!("monitor.interval_secs must be greater than zero");
        }
        if self.vpn.catalog.is_empty() {
            bail!("vpn.catalog must list at least one location");
        }
        if !is_python_module(&self.bootstrap.probe_module) {
            bail!(
                "bootstrap.probe_module {:?} is not a Python module name",
                self.bootstrap.probe_module
            );
        }
        if self.remote.venv_dir.trim().is_empty() {
            bail!("remote.venv_dir must not be empty");
        }
        Ok(())
    }
}

/// Dotted Python identifier, e.g. `fake_useragent` or `tls_client.sessions`.
fn is_python_module(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Load from an explicit path, or the default path when it exists.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    match path {
        Some(p) => {
            if !p.exists() {
                bail!("config file {} not found", p.display());
            }
            figment = figment.merge(Yaml::file(p));
        }
        None => {
            let default = Config::default_path()?;
            if default.exists() {
                figment = figment.merge(Yaml::file(default));
            }
        }
    }

    let config: Config = figment
        .merge(Env::prefixed("FLEETWARD_").split("__"))
        .extract()
        .context("parsing fleetward configuration")?;
    config.validate()?;
    Ok(config)
}
