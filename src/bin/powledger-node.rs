#![forbid(unsafe_code)]
//! powledger node: serves the ledger API and joins the configured peers

use clap::Parser;
use powledger::api::run_api_server;
use powledger::config::load_config;
use powledger::node::Node;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// Port to serve the API on, overriding network.api_port
    #[arg(long)]
    port: Option<u16>,
    /// Public URL of this node, overriding network.node_url
    #[arg(long)]
    node_url: Option<String>,
    /// Extra bootstrap peer URLs
    #[arg(long = "peer")]
    peers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.port {
        config.network.api_port = port;
    }
    if let Some(url) = cli.node_url {
        config.network.node_url = Some(url);
    }
    config.network.bootstrap_peers.extend(cli.peers);
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let node = Arc::new(Node::with_http(config));
    info!(
        node_url = node.node_url(),
        node_address = %node.config.miner.node_address,
        "starting powledger node"
    );

    let api_node = node.clone();
    let api_task = tokio::spawn(async move { run_api_server(api_node).await });

    if let Err(e) = node.bootstrap().await {
        error!(error = %e, "bootstrap failed");
    }

    api_task.await??;
    Ok(())
}
