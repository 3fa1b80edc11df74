use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use crate::config;

/// Validate the configuration and print the effective values.
pub fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = config::load(config_path.as_deref())?;

    println!("{}", "fleetward check-config".bold());
    println!("  hosts:    {}", config.hosts.join(", "));
    let auth = match (&config.ssh.password, &config.ssh.identity_file) {
        (Some(_), _) => " (password via sshpass)".to_string(),
        (None, Some(key)) => format!(" (key {})", key.display()),
        (None, None) => String::new(),
    };
    println!(
        "  ssh:      {}@<host>:{}{}",
        config.ssh.user, config.ssh.port, auth
    );
    println!("  project:  {}", config.remote.project_dir);

    let payload = &config.payload.local_path;
    if payload.is_file() {
        println!("  payload:  {} {}", payload.display(), "found".green());
    } else {
        println!("  payload:  {} {}", payload.display(), "missing".red());
        println!("  hint:     deploy will fail until the payload exists");
    }

    println!("  monitor:  every {}s", config.monitor.interval_secs);
    println!("  listen:   {}", config.daemon.http_addr);
    Ok(())
}
