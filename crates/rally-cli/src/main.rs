//! Rally command-line peer
//!
//! Runs a replicated initiative tracker and keeps it in sync with other
//! `rally` processes over TCP.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod peer;

use config::{Overrides, RallyConfig};

#[derive(Parser)]
#[command(name = "rally")]
#[command(about = "Rally - serverless replicated initiative tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path; `rally.toml` is read if present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a replica, sync with peers and read commands from stdin
    Peer(PeerArgs),
}

#[derive(Args)]
struct PeerArgs {
    /// Replica identifier
    #[arg(long)]
    client_id: Option<String>,

    /// Address to accept peers on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Peer to dial, repeatable
    #[arg(short, long = "peer")]
    peers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Peer(args) => {
            let overrides = Overrides {
                client_id: args.client_id,
                listen: args.listen,
                peers: args.peers,
                verbose: cli.verbose,
            };
            let config = RallyConfig::load(
                cli.config.as_deref(),
                |key| std::env::var(key).ok(),
                overrides,
            )?;

            // RUST_LOG wins over the configured level
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();

            let client = config.client_id()?;
            peer::run(config, client).await?;
        }
    }

    Ok(())
}
