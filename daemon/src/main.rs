//! ROTA daemon: entry point for running a ROTA node.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rota_node::{init_logging, LogFormat, NodeConfig, RotaNode};

#[derive(Parser)]
#[command(name = "rota-daemon", about = "ROTA proof-of-turn ledger node")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "ROTA_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the ledger snapshot store.
    #[arg(long, env = "ROTA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Port for P2P connections.
    #[arg(long, env = "ROTA_P2P_PORT")]
    port: Option<u16>,

    /// Address other nodes should dial to reach this one ("host:port").
    #[arg(long, env = "ROTA_PUBLIC_ADDR")]
    public_addr: Option<String>,

    /// Peer addresses to connect to (comma-separated: "1.2.3.4:3000,5.6.7.8:3000").
    #[arg(long, env = "ROTA_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// BIP39 phrase of the validator identity. Omit to run as an observer.
    #[arg(long, env = "VALIDATOR_MNEMONIC", hide_env_values = true)]
    validator_mnemonic: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "ROTA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "ROTA_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node operations.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Generate a validator mnemonic and print it with its address.
    Keygen,
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT/SIGTERM.
    Run,
}

impl Cli {
    /// Layer CLI flags and env vars over the file config (or defaults).
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => NodeConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(addr) = &self.public_addr {
            config.public_addr = Some(addr.clone());
        }
        if !self.peers.is_empty() {
            config.bootstrap_peers = self.peers.clone();
        }
        if let Some(phrase) = &self.validator_mnemonic {
            config.validator_mnemonic = Some(phrase.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        Ok(config)
    }
}

async fn run_node(config: NodeConfig) -> anyhow::Result<()> {
    tracing::info!(
        port = config.port,
        data_dir = %config.data_dir.display(),
        public_addr = config.public_addr.as_deref().unwrap_or("-"),
        "starting ROTA node"
    );
    if !config.bootstrap_peers.is_empty() {
        tracing::info!(peers = %config.bootstrap_peers.join(", "), "bootstrap peers");
    }

    let mut node = RotaNode::new(config).context("initializing node")?;
    node.start().await.context("starting node")?;

    node.wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping node");
    node.stop().await?;

    tracing::info!("ROTA daemon exited cleanly");
    Ok(())
}

fn keygen() -> anyhow::Result<()> {
    let phrase = rota_crypto::generate_mnemonic()?;
    let keypair = rota_crypto::keypair_from_mnemonic(&phrase)?;
    let address = rota_crypto::address_from_public(&keypair.public);
    println!("mnemonic: {phrase}");
    println!("address:  {address}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Keygen => keygen(),
        Command::Node { action } => match action {
            NodeAction::Run => {
                let config = cli.node_config()?;
                init_logging(config.log_format, &config.log_level);
                run_node(config).await
            }
        },
    }
}
