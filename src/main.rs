//! chain-submit - broadcast and confirm ledger transactions from the command line

use anyhow::{bail, Context, Result};
use chain_submit::chain::{BroadcastOutcome, CometRpcClient, InclusionWatcher, NodeRpc};
use chain_submit::classify::{classify_broadcast_error, classify_check_tx, BroadcastClass};
use chain_submit::config::{LogConfig, Settings};
use chain_submit::tx::tx_hash;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "chain-submit")]
#[command(version, about = "Broadcast and confirm ledger transactions", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CHAIN_SUBMIT_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Check node health and sync status
    Status,
    /// Broadcast and track transactions
    Tx {
        #[command(subcommand)]
        command: TxCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Load and validate the configuration file
    Validate,
}

#[derive(Subcommand)]
enum TxCommand {
    /// Wait until a transaction is included and print its result
    Wait {
        /// Hex-encoded transaction hash
        hash: String,
    },
    /// Broadcast a signed transaction and wait for inclusion
    Broadcast {
        /// Hex-encoded signed transaction bytes
        tx_hex: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config {
        command: ConfigCommand::Init { force },
    } = &cli.command
    {
        init_logging(&LogConfig::default());
        return init_config(&cli.config, *force);
    }

    let settings = Settings::load_from(&cli.config)?;
    init_logging(&settings.log);

    info!("Starting chain-submit v{}", env!("CARGO_PKG_VERSION"));

    tokio::select! {
        result = run(cli.command, settings) => result,
        _ = shutdown_signal() => {
            warn!("Interrupted, abandoning in-flight operation");
            bail!("interrupted")
        }
    }
}

async fn run(command: Commands, settings: Settings) -> Result<()> {
    match command {
        Commands::Config { command } => match command {
            ConfigCommand::Validate => {
                println!("Configuration is valid (chain {})", settings.rpc.chain_id);
                Ok(())
            }
            // handled before settings are loaded
            ConfigCommand::Init { .. } => Ok(()),
        },
        Commands::Status => {
            let client = CometRpcClient::from_settings(&settings)?;
            if !client.health_check().await {
                bail!("node {} is unhealthy", client.rpc_url());
            }
            let status = client.status().await.context("Failed to query node status")?;
            if status.network != settings.rpc.chain_id {
                warn!(
                    "Node network {} does not match configured chain {}",
                    status.network, settings.rpc.chain_id
                );
            }
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Commands::Tx { command } => {
            let client = Arc::new(CometRpcClient::from_settings(&settings)?);
            let options = settings.tx_options()?;
            let watcher = InclusionWatcher::new(
                client.clone(),
                options.inclusion_retry,
                options.query_prove,
                options.chain_id.clone(),
            );

            let hash = match command {
                TxCommand::Wait { hash } => hash.to_uppercase(),
                TxCommand::Broadcast { tx_hex } => {
                    let tx_bytes = hex::decode(tx_hex.trim())
                        .context("Transaction bytes must be hex encoded")?;
                    let outcome = broadcast_once(client.as_ref(), &tx_bytes).await?;
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                    outcome.hash
                }
            };

            let result = watcher.await_inclusion(&hash).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_ok() {
                bail!(
                    "Tx failed: code={}, codespace={}, log={}",
                    result.code,
                    result.codespace,
                    result.log
                );
            }
            Ok(())
        }
    }
}

/// Broadcast pre-signed bytes; a mempool duplicate counts as accepted
async fn broadcast_once(node: &dyn NodeRpc, tx_bytes: &[u8]) -> Result<BroadcastOutcome> {
    let local_hash = tx_hash(tx_bytes);

    let outcome = match node.broadcast_tx_sync(tx_bytes).await {
        Ok(outcome) => outcome,
        Err(e) if classify_broadcast_error(&e) == BroadcastClass::AlreadyInMempool => {
            return Ok(BroadcastOutcome::already_in_mempool(local_hash, e.to_string()));
        }
        Err(e) => return Err(e).context("Failed to broadcast transaction"),
    };

    match classify_check_tx(outcome.code, &outcome.codespace, &outcome.log) {
        BroadcastClass::Accepted => Ok(outcome),
        BroadcastClass::AlreadyInMempool => Ok(BroadcastOutcome::already_in_mempool(
            local_hash,
            outcome.log,
        )),
        _ => {
            error!("Transaction {} rejected by mempool", outcome.hash);
            bail!(
                "Tx sync broadcast failed: code={}, codespace={}, log={}",
                outcome.code,
                outcome.codespace,
                outcome.log
            )
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file {:?} already exists, pass --force to overwrite",
            path
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let rendered = Settings::default().to_toml()?;
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Wrote default configuration to {:?}", path);
    Ok(())
}

fn init_logging(config: &LogConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,reqwest=warn", config.level)));

    // stdout carries command output
    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
