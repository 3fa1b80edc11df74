//! `RemoteChannel` backed by the system `ssh` and `scp` clients.
//!
//! Key sessions run non-interactively (`BatchMode=yes`), so hosts must accept
//! the configured key. With a shared password configured, the client is
//! wrapped in `sshpass -e` and the password travels in the child's
//! environment, never on the command line. Every child process is spawned
//! with `kill_on_drop`, which closes the session on success, error, timeout
//! and cancellation alike.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{shell_quote, ExecOutput, RemoteChannel};
use crate::config::SshConfig;
use crate::error::{FleetError, Result};

/// Exit status ssh reserves for its own failures (connect, auth, ...).
///
/// A remote command that itself exits 255 is indistinguishable from this and
/// is reported as a connection failure; its stdout is discarded.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// sshpass: wrong password (5) or unknown host key (6).
const SSHPASS_AUTH_FAILURES: [i32; 2] = [5, 6];

pub struct SshChannel {
    config: SshConfig,
}

struct RawOutput {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl SshChannel {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn uses_password(&self) -> bool {
        self.config.password.is_some()
    }

    fn common_options(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.uses_password() {
            // BatchMode would disable the password prompt sshpass answers.
            args.extend([
                "-o".to_string(),
                "PreferredAuthentications=password,keyboard-interactive".to_string(),
                "-o".to_string(),
                "PubkeyAuthentication=no".to_string(),
            ]);
        } else {
            args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        }
        args.extend([
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ]);
        if let Some(key) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args
    }

    /// `program`, or `sshpass -e program` with `SSHPASS` set when a password
    /// is configured.
    fn client(&self, program: &str) -> Command {
        match &self.config.password {
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg(program).env("SSHPASS", password);
                cmd
            }
            None => Command::new(program),
        }
    }

    fn ssh(&self, host: &str, command: &str) -> Command {
        let mut cmd = self.client("ssh");
        cmd.args(self.common_options())
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg(format!("{}@{}", self.config.user, host))
            .arg("--")
            .arg(command);
        cmd
    }

    fn scp(&self, host: &str, local_path: &Path, remote_path: &str) -> Command {
        // scp needs brackets around IPv6 literals in the target.
        let target_host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        let mut cmd = self.client("scp");
        cmd.arg("-q")
            .args(self.common_options())
            .arg("-P")
            .arg(self.config.port.to_string())
            .arg(local_path)
            .arg(format!("{}@{}:{}", self.config.user, target_host, remote_path));
        cmd
    }

    /// Upper bound for a transfer: session setup plus the default command budget.
    fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.config.connect_timeout_secs + self.config.command_timeout_secs)
    }

    async fn run(
        &self,
        host: &str,
        mut cmd: Command,
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<RawOutput> {
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| FleetError::connection(host, format!("failed to launch ssh client: {e}")))?;

        let input = stdin.map(|data| data.to_vec());
        let pipe = child.stdin.take();
        let session = async move {
            if let (Some(mut pipe), Some(data)) = (pipe, input) {
                pipe.write_all(&data).await?;
                pipe.shutdown().await?;
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(timeout, session).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(FleetError::connection(host, format!("session I/O failed: {e}")));
            }
            Err(_) => {
                return Err(FleetError::Timeout {
                    host: host.to_string(),
                    after: timeout,
                });
            }
        };

        let raw = RawOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        let auth_failed = self.uses_password()
            && raw.code.is_some_and(|code| SSHPASS_AUTH_FAILURES.contains(&code));
        if raw.code == Some(SSH_CONNECTION_FAILURE) || auth_failed || looks_like_connection_failure(&raw) {
            return Err(FleetError::connection(host, raw.stderr.trim()));
        }
        Ok(raw)
    }
}

/// scp reports connection problems with exit status 1, so fall back to the
/// messages ssh prints when it fails before running anything.
fn looks_like_connection_failure(raw: &RawOutput) -> bool {
    if raw.code == Some(0) {
        return false;
    }
    let stderr = raw.stderr.trim_start();
    stderr.starts_with("ssh:")
        || stderr.contains("Permission denied (")
        || stderr.contains("Host key verification failed")
        || stderr.contains("Connection closed by")
}

impl RemoteChannel for SshChannel {
    async fn execute(&self, host: &str, command: &str, timeout: Duration) -> Result<ExecOutput> {
        debug!(host = %host, command = %command, timeout_secs = timeout.as_secs(), "ssh exec");
        let raw = self.run(host, self.ssh(host, command), None, timeout).await?;
        debug!(host = %host, code = ?raw.code, "ssh exec finished");
        Ok(ExecOutput {
            stdout: raw.stdout,
            stderr: raw.stderr,
        })
    }

    async fn upload(&self, host: &str, local_path: &Path, remote_path: &str) -> Result<()> {
        debug!(host = %host, local = %local_path.display(), remote = %remote_path, "scp upload");
        let raw = self
            .run(
                host,
                self.scp(host, local_path, remote_path),
                None,
                self.transfer_timeout(),
            )
            .await?;
        if raw.code != Some(0) {
            return Err(FleetError::command(
                host,
                format!("upload to {} failed: {}", remote_path, raw.stderr.trim()),
            ));
        }
        Ok(())
    }

    async fn write_remote_file(&self, host: &str, remote_path: &str, content: &str) -> Result<()> {
        debug!(host = %host, remote = %remote_path, bytes = content.len(), "writing remote file");
        let command = format!("cat > {}", shell_quote(remote_path));
        let raw = self
            .run(
                host,
                self.ssh(host, &command),
                Some(content.as_bytes()),
                self.transfer_timeout(),
            )
            .await?;
        if raw.code != Some(0) {
            return Err(FleetError::command(
                host,
                format!("writing {} failed: {}", remote_path, raw.stderr.trim()),
            ));
        }
        Ok(())
    }
}
