//! Deployment pipeline: payload upload plus an idempotent environment
//! bootstrap.
//!
//! 1. `mkdir -p` the project directory (best-effort)
//! 2. upload the payload (local artifact must exist)
//! 3. `chmod +x` it
//! 4. upload the bootstrap script
//! 5. run the bootstrap with a long timeout
//!
//! The first hard failure ends the pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{BootstrapConfig, PayloadConfig, RemoteConfig};
use crate::error::{FleetError, Result};
use crate::remote::{shell_quote, RemoteChannel};

/// Printed by the bootstrap when the environment is already usable.
pub const ENV_READY_MARKER: &str = "fleetward: environment ready";

pub struct Deployer<C> {
    channel: Arc<C>,
    remote: RemoteConfig,
    payload: PayloadConfig,
    bootstrap: BootstrapConfig,
    command_timeout: Duration,
}

impl<C: RemoteChannel> Deployer<C> {
    pub fn new(
        channel: Arc<C>,
        remote: RemoteConfig,
        payload: PayloadConfig,
        bootstrap: BootstrapConfig,
        command_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            remote,
            payload,
            bootstrap,
            command_timeout,
        }
    }

    pub async fn deploy(&self, host: &str) -> Result<String> {
        let digest = self.payload_digest().await?;
        info!(host = %host, payload = %self.payload.local_path.display(), digest = %digest, "deploying");

        let mkdir = format!("mkdir -p {}", shell_quote(&self.remote.project_dir));
        if let Err(e) = self.channel.execute(host, &mkdir, self.command_timeout).await {
            debug!(host = %host, error = %e, "mkdir failed, continuing");
        }

        let remote_payload = self.remote.payload_path();
        self.channel
            .upload(host, &self.payload.local_path, &remote_payload)
            .await?;
        self.make_executable(host, &remote_payload).await?;

        let bootstrap_path = self.remote.bootstrap_path();
        self.channel
            .write_remote_file(host, &bootstrap_path, &bootstrap_script(&self.remote, &self.bootstrap))
            .await?;
        self.make_executable(host, &bootstrap_path).await?;

        info!(host = %host, "running environment bootstrap");
        let out = self
            .channel
            .execute(
                host,
                &format!(
                    "cd {} && bash {}",
                    shell_quote(&self.remote.project_dir),
                    shell_quote(&bootstrap_path)
                ),
                Duration::from_secs(self.bootstrap.timeout_secs),
            )
            .await?;
        debug!(host = %host, stdout = %out.stdout, stderr = %out.stderr, "bootstrap output");

        let environment = if out.stdout.contains(ENV_READY_MARKER) {
            "environment already provisioned"
        } else {
            "environment provisioned"
        };
        Ok(format!(
            "deployed {} (sha256:{}); {}",
            self.remote.payload_name,
            &digest[..12],
            environment
        ))
    }

    /// Hex SHA-256 of the local payload. Fails before any remote call when
    /// the artifact is missing.
    async fn payload_digest(&self) -> Result<String> {
        let path = &self.payload.local_path;
        if !path.is_file() {
            return Err(FleetError::Precondition(format!(
                "payload not found at {}",
                absolute(path).display()
            )));
        }
        let bytes = tokio::fs::read(path).await?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    async fn make_executable(&self, host: &str, path: &str) -> Result<()> {
        let out = self
            .channel
            .execute(host, &format!("chmod +x {}", shell_quote(path)), self.command_timeout)
            .await?;
        if !out.stderr.trim().is_empty() {
            return Err(FleetError::command(
                host,
                format!("chmod {} failed: {}", path, out.stderr.trim()),
            ));
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> std::path::PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Shell script that provisions the virtual environment, or exits at once
/// when the probe module already imports inside it.
pub fn bootstrap_script(remote: &RemoteConfig, bootstrap: &BootstrapConfig) -> String {
    let packages = bootstrap
        .packages
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        r#"#!/bin/bash
PROJECT={project}
VENV={venv}
PY="$VENV/bin/python"

cd "$PROJECT" || exit 1

if [ -x "$PY" ] && "$PY" -c "import {probe}" >/dev/null 2>&1; then
    echo "{marker}"
    exit 0
fi

rm -rf "$VENV"
python3 -m venv "$VENV"
source "$VENV/bin/activate"
pip install --upgrade pip
pip install {packages}
"#,
        project = shell_quote(&remote.project_dir),
        venv = shell_quote(&remote.venv_path()),
        probe = bootstrap.probe_module,
        marker = ENV_READY_MARKER,
        packages = packages,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_short_circuits_before_reinstall() {
        let script = bootstrap_script(&RemoteConfig::default(), &BootstrapConfig::default());
        let guard = script.find("import fake_useragent").unwrap();
        let early_exit = script.find("exit 0").unwrap();
        let wipe = script.find("rm -rf \"$VENV\"").unwrap();
        assert!(guard < early_exit);
        assert!(early_exit < wipe);
        assert!(script.contains(ENV_READY_MARKER));
    }

    #[test]
    fn bootstrap_installs_configured_packages() {
        let bootstrap = BootstrapConfig {
            packages: vec!["requests".into(), "websockets>=12".into()],
            ..BootstrapConfig::default()
        };
        let script = bootstrap_script(&RemoteConfig::default(), &bootstrap);
        assert!(script.contains("pip install requests 'websockets>=12'"));
        assert!(script.starts_with("#!/bin/bash\n"));
    }

    #[test]
    fn bootstrap_resolves_venv_like_the_launcher() {
        let relative = bootstrap_script(&RemoteConfig::default(), &BootstrapConfig::default());
        assert!(relative.contains("\nVENV=/home/kali/Desktop/kick-viewbot-main/venv\n"));

        let remote = RemoteConfig {
            venv_dir: "/opt/venvs/kick env".into(),
            ..RemoteConfig::default()
        };
        let absolute = bootstrap_script(&remote, &BootstrapConfig::default());
        assert!(absolute.contains("\nVENV='/opt/venvs/kick env'\n"));
        assert!(!absolute.contains("$PROJECT//"));
    }
}
