#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleetward::config::Config;
use fleetward::error::{FleetError, Result};
use fleetward::remote::{ExecOutput, RemoteChannel};

/// Simulated state of one remote host.
#[derive(Debug, Clone)]
pub struct HostSim {
    pub reachable: bool,
    pub running: bool,
    pub pid: u32,
    pub kill_ineffective: bool,
    pub start_fails: bool,
    pub env_ready: bool,
    pub installs: u32,
    pub log: String,
    pub vpn_connected: bool,
    pub vpn_location: String,
    pub pending_location: String,
    pub set_location_fails: bool,
    pub connect_fails: bool,
    pub files: HashMap<String, String>,
    pub uploads: Vec<String>,
}

impl Default for HostSim {
    fn default() -> Self {
        Self {
            reachable: true,
            running: false,
            pid: 0,
            kill_ineffective: false,
            start_fails: false,
            env_ready: false,
            installs: 0,
            log: String::new(),
            vpn_connected: true,
            vpn_location: "us-nyc".into(),
            pending_location: "us-nyc".into(),
            set_location_fails: false,
            connect_fails: false,
            files: HashMap::new(),
            uploads: Vec::new(),
        }
    }
}

/// Scripted `RemoteChannel`: answers commands from per-host state and
/// records every call.
#[derive(Clone, Default)]
pub struct MockChannel {
    hosts: Arc<Mutex<HashMap<String, HostSim>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    next_pid: Arc<Mutex<u32>>,
}

impl MockChannel {
    pub fn new(hosts: &[&str]) -> Self {
        let channel = Self::default();
        {
            let mut map = channel.hosts.lock().unwrap();
            for host in hosts {
                map.insert(host.to_string(), HostSim::default());
            }
        }
        *channel.next_pid.lock().unwrap() = 4000;
        channel
    }

    pub fn update(&self, host: &str, f: impl FnOnce(&mut HostSim)) {
        let mut map = self.hosts.lock().unwrap();
        f(map.entry(host.to_string()).or_default());
    }

    pub fn host(&self, host: &str) -> HostSim {
        self.hosts.lock().unwrap().get(host).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, host: &str, call: String) -> Result<()> {
        self.calls.lock().unwrap().push((host.to_string(), call));
        let map = self.hosts.lock().unwrap();
        match map.get(host) {
            Some(sim) if sim.reachable => Ok(()),
            _ => Err(FleetError::connection(host, "ssh: connect to host: No route to host")),
        }
    }

    fn answer(&self, host: &str, command: &str) -> ExecOutput {
        let mut map = self.hosts.lock().unwrap();
        let sim = map.get_mut(host).expect("host exists");

        if command.starts_with("mullvad status") {
            return if sim.vpn_connected {
                ExecOutput::new(
                    format!("Connected to {}-wg-001 in Somewhere\n", sim.vpn_location),
                    "",
                )
            } else {
                ExecOutput::new("Disconnected\n", "")
            };
        }
        if command.starts_with("mullvad disconnect") {
            sim.vpn_connected = false;
            return ExecOutput::default();
        }
        if let Some(location) = command.strip_prefix("mullvad relay set location ") {
            if sim.set_location_fails {
                return ExecOutput::new("", "Error: Failed to update relay settings\n");
            }
            sim.pending_location = location.trim().to_string();
            return ExecOutput::default();
        }
        if command.starts_with("mullvad connect") {
            if !sim.connect_fails {
                sim.vpn_connected = true;
                sim.vpn_location = sim.pending_location.clone();
            }
            return ExecOutput::default();
        }
        if command.starts_with("pkill -f") {
            if !sim.kill_ineffective {
                sim.running = false;
            }
            return ExecOutput::default();
        }
        if command.starts_with("bash ") && command.contains("start_payload.sh") {
            if sim.start_fails {
                return ExecOutput::new("", "python: can't open file 'kick.py'\n");
            }
            let mut next = self.next_pid.lock().unwrap();
            *next += 1;
            sim.pid = *next;
            sim.running = true;
            return ExecOutput::new(format!("{}\n", sim.pid), "");
        }
        if command.contains("pgrep -f") {
            return if sim.running {
                ExecOutput::new(format!("{}\n", sim.pid), "")
            } else {
                ExecOutput::default()
            };
        }
        if command.starts_with("tail -n") {
            return ExecOutput::new(sim.log.clone(), "");
        }
        if command.starts_with("cd ") && command.contains("ensure_venv.sh") {
            if sim.env_ready {
                return ExecOutput::new("fleetward: environment ready\n", "");
            }
            sim.installs += 1;
            sim.env_ready = true;
            return ExecOutput::new("Successfully installed fake_useragent\n", "");
        }
        ExecOutput::default()
    }
}

impl RemoteChannel for MockChannel {
    async fn execute(&self, host: &str, command: &str, _timeout: Duration) -> Result<ExecOutput> {
        self.record(host, command.to_string())?;
        Ok(self.answer(host, command))
    }

    async fn upload(&self, host: &str, local_path: &Path, remote_path: &str) -> Result<()> {
        self.record(host, format!("upload {} {}", local_path.display(), remote_path))?;
        self.update(host, |sim| sim.uploads.push(remote_path.to_string()));
        Ok(())
    }

    async fn write_remote_file(&self, host: &str, remote_path: &str, content: &str) -> Result<()> {
        self.record(host, format!("write {}", remote_path))?;
        self.update(host, |sim| {
            sim.files.insert(remote_path.to_string(), content.to_string());
        });
        Ok(())
    }
}

pub fn config(hosts: &[&str]) -> Config {
    Config {
        hosts: hosts.iter().map(|h| h.to_string()).collect(),
        ..Config::default()
    }
}
