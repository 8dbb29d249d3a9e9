use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cometway_comet::{AdapterState, Comet, CometConfig};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod app;
mod node;

use app::DemoApp;
use node::NodeConfig;

/// File `init` writes under the home directory
const NODE_CONFIG_FILE: &str = "cometway.toml";

#[derive(Parser)]
#[command(
    name = "cometway",
    about = "CometBFT consensus adapter node",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Write a node configuration for a new home directory")]
    Init {
        #[arg(long, value_name = "DIR", help = "Home directory for configuration and engine data")]
        home: PathBuf,

        #[arg(long, value_name = "ID", help = "Chain ID")]
        chain_id: String,

        #[arg(long, value_name = "FILE", help = "Genesis file path")]
        genesis: Option<PathBuf>,

        #[arg(long, value_name = "PORT", default_value_t = 26656, help = "Engine P2P port")]
        p2p_port: u16,

        #[arg(long, value_name = "PORT", default_value_t = 26657, help = "Engine RPC port")]
        rpc_port: u16,
    },

    #[command(about = "Run the adapter and the engine until interrupted")]
    Start {
        #[arg(long, value_name = "FILE", help = "Configuration file path")]
        config: PathBuf,

        #[arg(long, value_name = "LEVEL", help = "Log level (trace, debug, info, warn, error)")]
        log_level: Option<String>,
    },

    #[command(about = "Display version information")]
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            home,
            chain_id,
            genesis,
            p2p_port,
            rpc_port,
        } => init_command(home, chain_id, genesis, p2p_port, rpc_port),
        Commands::Start { config, log_level } => start_command(config, log_level).await,
        Commands::Version => version_command(),
    }
}

fn init_command(
    home: PathBuf,
    chain_id: String,
    genesis: Option<PathBuf>,
    p2p_port: u16,
    rpc_port: u16,
) -> Result<()> {
    setup_logging(None, false)?;

    let config_path = home.join(NODE_CONFIG_FILE);
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }
    std::fs::create_dir_all(&home)
        .with_context(|| format!("failed to create {}", home.display()))?;
    let home = home
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", home.display()))?;
    let engine_home = home.join("cometbft");

    // Without a genesis file the engine's own `init` generates one.
    let genesis_file = match genesis {
        Some(path) => {
            validate_genesis_file(&path, &chain_id)?;
            path.canonicalize()
                .with_context(|| format!("failed to resolve {}", path.display()))?
        }
        None => engine_home.join("config").join("genesis.json"),
    };

    let node = NodeConfig {
        chain_id: chain_id.clone(),
        comet: CometConfig {
            genesis_file: Some(genesis_file),
            p2p_port: Some(p2p_port),
            rpc_port: Some(rpc_port),
            ..CometConfig::with_home(engine_home)
        },
        ..NodeConfig::default()
    };
    node.save_to_file(&config_path)?;

    tracing::info!("Initialized node for chain-id: {}", chain_id);
    tracing::info!("Node configuration: {}", config_path.display());
    Ok(())
}

async fn start_command(config: PathBuf, log_level: Option<String>) -> Result<()> {
    let node = NodeConfig::load_from_file(&config)?;
    setup_logging(log_level.or_else(|| node.log_level.clone()), node.log_json)?;

    tracing::info!("Starting node {} for chain-id {}", node.instance_id, node.chain_id);
    tracing::info!("Engine home: {}", node.comet.home.display());

    let app = Arc::new(DemoApp::new(node.chain_id.clone()));
    let mut comet = Comet::new(app, node.instance_id.clone(), node.comet);
    comet.start()?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("Shutting down...");
        }
        _ = adapter_done(&comet) => {}
    }
    comet.stop().await;

    if let Some(error) = comet.error() {
        bail!("adapter failed ({}): {}", comet.error_code(), error);
    }
    tracing::info!("Node stopped");
    Ok(())
}

/// Resolves once the adapter has stopped on its own
async fn adapter_done(comet: &Comet) {
    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    loop {
        ticker.tick().await;
        if matches!(
            comet.state(),
            AdapterState::Finished | AdapterState::Terminated | AdapterState::Stopped
        ) {
            return;
        }
    }
}

fn version_command() -> Result<()> {
    println!("cometway {}", env!("CARGO_PKG_VERSION"));
    println!("build: {}", env!("CARGO_PKG_NAME"));
    Ok(())
}

// Helper functions

fn setup_logging(log_level: Option<String>, json: bool) -> Result<()> {
    let level = log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    cometway_log::init_tracing_with_level(&level, json).map_err(|e| anyhow::anyhow!(e))
}

fn validate_genesis_file(path: &Path, chain_id: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let genesis: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    match genesis.get("chain_id").and_then(Value::as_str) {
        Some(id) if id == chain_id => Ok(()),
        Some(id) => bail!("genesis is for chain {id}, not {chain_id}"),
        None => bail!("genesis file has no chain_id"),
    }
}
