//! Start, stop and observe the payload process on a host.
//!
//! The PID printed by the launcher is kept as a handle and checked first.
//! The name pattern (`pgrep -f`) is the fallback when no live handle exists,
//! e.g. for processes started before this controller came up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{ProcessConfig, RemoteConfig};
use crate::error::{FleetError, Result};
use crate::remote::{shell_quote, RemoteChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Running,
    Stopped,
}

/// Input handed to the payload on stdin, one value per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartParams {
    pub channel: String,
    pub viewer_count: u32,
}

pub struct ProcessController<C> {
    channel: Arc<C>,
    remote: RemoteConfig,
    config: ProcessConfig,
    command_timeout: Duration,
    handles: RwLock<HashMap<String, u32>>,
}

impl<C: RemoteChannel> ProcessController<C> {
    pub fn new(
        channel: Arc<C>,
        remote: RemoteConfig,
        config: ProcessConfig,
        command_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            remote,
            config,
            command_timeout,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// PID recorded at the last launch on `host`, if still believed alive.
    pub async fn handle(&self, host: &str) -> Option<u32> {
        self.handles.read().await.get(host).copied()
    }

    /// Replace any running instance with a fresh detached one.
    pub async fn start(&self, host: &str, params: &StartParams) -> Result<String> {
        info!(host = %host, channel = %params.channel, viewers = params.viewer_count, "starting payload");

        // Best-effort: a failed kill is not an error, an unreachable host is.
        self.channel
            .execute(host, &self.kill_command(host).await, self.command_timeout)
            .await?;
        self.handles.write().await.remove(host);
        self.pause(self.config.kill_settle_ms).await;

        let launcher = self.remote.launcher_path();
        self.channel
            .write_remote_file(host, &launcher, &self.launcher_script(params))
            .await?;
        let out = self
            .channel
            .execute(
                host,
                &format!("bash {}", shell_quote(&launcher)),
                self.command_timeout,
            )
            .await?;

        let pid = parse_pid(&out.stdout);
        match pid {
            Some(pid) => {
                debug!(host = %host, pid, "payload launched");
                self.handles.write().await.insert(host.to_string(), pid);
            }
            None => warn!(host = %host, stdout = %out.stdout.trim(), "launcher printed no PID"),
        }

        self.pause(self.config.start_settle_ms).await;

        match self.check_liveness(host).await? {
            Liveness::Running => {
                info!(host = %host, pid = ?pid, "payload running");
                Ok(match pid {
                    Some(pid) => format!("payload started (pid {})", pid),
                    None => "payload started".to_string(),
                })
            }
            Liveness::Stopped => {
                self.handles.write().await.remove(host);
                let stderr = out.stderr.trim();
                Err(FleetError::command(
                    host,
                    if stderr.is_empty() {
                        "payload did not start".to_string()
                    } else {
                        format!("payload did not start: {}", stderr)
                    },
                ))
            }
        }
    }

    /// Signal the payload and confirm it is gone.
    pub async fn stop(&self, host: &str) -> Result<String> {
        info!(host = %host, "stopping payload");
        self.channel
            .execute(host, &self.kill_command(host).await, self.command_timeout)
            .await?;
        self.pause(self.config.kill_settle_ms).await;

        match self.check_liveness(host).await? {
            Liveness::Stopped => {
                self.handles.write().await.remove(host);
                Ok("payload stopped".to_string())
            }
            Liveness::Running => Err(FleetError::command(host, "payload still running")),
        }
    }

    /// Observe whether the payload is running. Does not change anything on
    /// the host; a dead handle is forgotten locally.
    pub async fn check_liveness(&self, host: &str) -> Result<Liveness> {
        let handle = self.handle(host).await;
        let pattern = shell_quote(&self_excluding_pattern(&self.remote.process_pattern));
        let command = match handle {
            Some(pid) => format!(
                "kill -0 {pid} 2>/dev/null && echo {pid} || pgrep -f {pattern}"
            ),
            None => format!("pgrep -f {pattern}"),
        };

        let out = self
            .channel
            .execute(
                host,
                &command,
                Duration::from_secs(self.config.liveness_timeout_secs),
            )
            .await?;

        if let Some(pid) = handle {
            let alive = out.stdout.lines().any(|l| l.trim() == pid.to_string());
            if !alive {
                debug!(host = %host, pid, "recorded handle is gone, using pattern match");
                self.handles.write().await.remove(host);
            }
        }

        Ok(if out.has_stdout() {
            Liveness::Running
        } else {
            Liveness::Stopped
        })
    }

    async fn kill_command(&self, host: &str) -> String {
        let pattern = shell_quote(&self_excluding_pattern(&self.remote.process_pattern));
        match self.handle(host).await {
            Some(pid) => format!("pkill -f {pattern}; kill {pid} 2>/dev/null; true"),
            None => format!("pkill -f {pattern}; true"),
        }
    }

    /// Launcher that detaches the payload from the session and prints its PID.
    fn launcher_script(&self, params: &StartParams) -> String {
        format!(
            "#!/bin/bash\n\
             cd {dir} || exit 1\n\
             source {venv}/bin/activate\n\
             printf '%s\\n%s\\n' {channel} {viewers} | nohup setsid python {payload} > {log} 2>&1 &\n\
             echo $!\n",
            dir = shell_quote(&self.remote.project_dir),
            venv = shell_quote(&self.remote.venv_path()),
            channel = shell_quote(&params.channel),
            viewers = params.viewer_count,
            payload = shell_quote(&self.remote.payload_name),
            log = shell_quote(&self.remote.log_file),
        )
    }

    async fn pause(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Last numeric line of the launcher output.
fn parse_pid(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().parse::<u32>().ok())
}

/// `python.*x` → `[p]ython.*x`: same matches, but the shell running the
/// command no longer matches its own command line.
fn self_excluding_pattern(pattern: &str) -> String {
    let mut chars = pattern.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => format!("[{}]{}", first, chars.as_str()),
        _ => pattern.to_string(),
    }
}
