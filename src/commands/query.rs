//! `fleetward health|status|action|logs|check`: talk to a running daemon.

use anyhow::Result;
use colored::Colorize;

use crate::client::FleetClient;
use crate::domain::dispatch::ActionRequest;
use crate::domain::types::{FleetStatus, HostState};

pub fn health(url: &str, format: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let health = rt.block_on(async {
        let client = FleetClient::new(url)?;
        client.health().await
    })?;
    match format {
        "json" => print_json(&health),
        _ => {
            println!("{} {}", "fleetward".bold(), health.version);
            println!("  uptime:   {}s", health.uptime_secs);
            println!(
                "  observed: {}/{} hosts",
                health.observed_hosts, health.host_count
            );
            Ok(())
        }
    }
}

pub fn status(url: &str, format: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let client = FleetClient::new(url)?;
        let data = client.fleet_status().await?;
        match format {
            "json" => print_json(&data),
            _ => {
                print_fleet_table(&data);
                Ok(())
            }
        }
    })
}

pub fn action(url: &str, request: ActionRequest) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let response = rt.block_on(async {
        let client = FleetClient::new(url)?;
        client.perform_action(&request).await
    })?;

    let icon = if response.success {
        "ok".green().bold()
    } else {
        "!!".red().bold()
    };
    let mut lines = response.message.lines();
    if let Some(first) = lines.next() {
        println!("{} {}", icon, first.bold());
    }
    for line in lines {
        println!("   {}", line);
    }

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

pub fn logs(url: &str, host: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let response = rt.block_on(async {
        let client = FleetClient::new(url)?;
        client.logs(host).await
    })?;

    for line in &response.logs {
        println!("{}", line);
    }
    if let Some(error) = response.error {
        eprintln!("{} {}", "!!".red().bold(), error);
        std::process::exit(1);
    }
    Ok(())
}

pub fn check(url: &str, host: &str, format: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let status = rt.block_on(async {
        let client = FleetClient::new(url)?;
        client.check_host(host).await
    })?;
    match format {
        "json" => print_json(&status),
        _ => {
            print_fleet_table(&FleetStatus {
                hosts: vec![status],
            });
            Ok(())
        }
    }
}

fn print_json<T: serde::Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{}", json);
    Ok(())
}

fn print_fleet_table(status: &FleetStatus) {
    println!("{}", "Fleet Status".bold());
    println!();

    for host in &status.hosts {
        let state = match host.state {
            HostState::Running => "running".green().bold(),
            HostState::Stopped => "stopped".yellow().bold(),
            HostState::Offline => "offline".red().bold(),
            HostState::Unknown => "unknown".dimmed(),
        };

        let vpn = match &host.vpn {
            Some(v) if v.connected => format!(
                "vpn {}",
                v.location.as_deref().unwrap_or("unknown")
            ),
            Some(_) => "vpn down".to_string(),
            None => String::new(),
        };

        let stats = host
            .stats
            .map(|s| {
                format!(
                    "conn {} / viewers {} / pings {} / hb {}",
                    s.connections, s.viewers, s.pings, s.heartbeats
                )
            })
            .unwrap_or_default();

        println!(
            "  {:<16} {:<8} {:<14} {}",
            host.host.bold(),
            state,
            vpn.dimmed(),
            stats
        );
        if let Some(error) = &host.error {
            println!("  {:<16} {}", "", error.dimmed());
        }
    }

    println!();
}
