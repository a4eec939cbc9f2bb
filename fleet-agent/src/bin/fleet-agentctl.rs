//! Inspects an agent's connectivity state from its configuration file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_agent::config::{AgentSettings, ConfigStore};
use fleet_agent::connectivity::{
    ConnectivityError, FailoverList, FailoverListStore, StdConsole, TcpProbe, unreachable_servers,
};
use fleet_agent::telemetry::{self, TelemetryConfig};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "fleet-agentctl", version, about = "Inspect fleet agent connectivity state")]
struct Cli {
    /// Agent configuration file.
    #[arg(short, long, default_value = "agent.json")]
    config: PathBuf,

    /// Log filter directive, overridden by `RUST_LOG`.
    #[arg(long, default_value = telemetry::DEFAULT_DIRECTIVE)]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the effective agent configuration with the token redacted.
    ShowConfig,
    /// Print the persisted failover list.
    ShowFailoverList,
    /// Check which failover list entries accept connections.
    ProbeFailoverList {
        /// Connect timeout per port, in seconds.
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&TelemetryConfig::new(cli.log.clone()))?;

    let store = ConfigStore::open(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let mut settings = store.snapshot();
    settings.data_directory = resolve_data_dir(&cli.config, &settings.data_directory);
    debug!(data_directory = %settings.data_directory.display(), "resolved data directory");

    match cli.command {
        Command::ShowConfig => {
            if settings.security_token.is_some() {
                settings.security_token = Some("<redacted>".into());
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::ShowFailoverList => {
            let list = persisted_list(&settings);
            if list.is_empty() {
                println!("no failover list persisted under {}", settings.data_directory.display());
            }
            for (index, server) in list.servers().iter().enumerate() {
                let marker = if settings.server.targets(server) { "*" } else { " " };
                println!("{marker} {index}: {server}");
            }
        }
        Command::ProbeFailoverList { timeout_secs } => {
            let list = persisted_list(&settings);
            if list.is_empty() {
                println!("no failover list persisted under {}", settings.data_directory.display());
                return Ok(());
            }
            let probe = TcpProbe::new(Duration::from_secs(timeout_secs));
            let failed = unreachable_servers(&probe, list.servers()).await;
            for server in list.servers() {
                let status = if failed.contains(server) { "unreachable" } else { "reachable" };
                println!("{server}\t{status}");
            }
            if failed.len() == list.size() {
                return Err(ConnectivityError::AllCandidatesUnreachable {
                    failed: failed.iter().map(ToString::to_string).collect(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn persisted_list(settings: &AgentSettings) -> FailoverList {
    FailoverListStore::new(&settings.data_directory, Arc::new(StdConsole)).load()
}

/// Relative data directories are resolved against the configuration file's directory.
fn resolve_data_dir(config: &Path, data_directory: &Path) -> PathBuf {
    if data_directory.is_absolute() {
        return data_directory.to_path_buf();
    }
    config
        .parent()
        .map_or_else(|| data_directory.to_path_buf(), |parent| parent.join(data_directory))
}
