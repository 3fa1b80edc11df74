use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fleetward::client::DEFAULT_BASE_URL;
use fleetward::commands;
use fleetward::domain::dispatch::ActionRequest;

#[derive(Parser)]
#[command(name = "fleetward", version, about = "Control plane for a fleet of remote worker hosts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fleetward daemon (REST + GraphQL + fleet monitor)
    Daemon {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Path to config file (default: ~/.config/fleetward/fleet.yaml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show daemon version, uptime and how many hosts it has observed
    Health {
        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,

        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        url: String,
    },

    /// Show the daemon's cached fleet status
    Status {
        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,

        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        url: String,
    },

    /// Run an action (deploy, start_all, stop_all, start_one, stop_one,
    /// vpn_reconnect_all, vpn_random_all, vpn_reconnect_one, vpn_random_one)
    Action {
        /// Action name
        name: String,

        /// Target host for single-host actions
        #[arg(long)]
        host: Option<String>,

        /// Channel passed to the payload on start
        #[arg(long, default_value = "")]
        channel: String,

        /// Viewer count passed to the payload on start
        #[arg(long, default_value_t = 100)]
        viewers: u32,

        /// Explicit VPN location for vpn_random_* actions
        #[arg(long)]
        location: Option<String>,

        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        url: String,
    },

    /// Print the last lines of a host's payload log
    Logs {
        host: String,

        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        url: String,
    },

    /// Check one host now and print the fresh status
    Check {
        host: String,

        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,

        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        url: String,
    },

    /// Validate the configuration and print effective values
    CheckConfig {
        /// Path to config file (default: ~/.config/fleetward/fleet.yaml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            http_addr,
            log_level,
            config,
        } => commands::daemon::run(http_addr, log_level, config),
        Commands::Health { format, url } => commands::query::health(&url, &format),
        Commands::Status { format, url } => commands::query::status(&url, &format),
        Commands::Action {
            name,
            host,
            channel,
            viewers,
            location,
            url,
        } => {
            let request = ActionRequest {
                action: name,
                host,
                channel,
                viewers,
                location,
            };
            commands::query::action(&url, request)
        }
        Commands::Logs { host, url } => commands::query::logs(&url, &host),
        Commands::Check { host, format, url } => commands::query::check(&url, &host, &format),
        Commands::CheckConfig { config } => commands::check::run(config),
    }
}
