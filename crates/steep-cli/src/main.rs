//! Steep operator CLI.
//!
//! Drives the initialization subsystem against the local node:
//!
//! ```bash
//! # Initialize this node from peer "a" via engine-driven copy
//! steep init start --source a --method snapshot
//!
//! # Operator-driven backup/restore
//! steep init prepare --ttl-secs 3600     # on the source
//! steep init complete --source a         # on the target, after restore
//!
//! # Portable snapshots
//! steep snapshot generate
//! steep snapshot verify .steep/snapshots/<id>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use steep_config::ConfigLoader;
use tracing_subscriber::EnvFilter;

/// Steep - control plane for active-active logical replication.
#[derive(Parser)]
#[command(name = "steep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialization lifecycle of the local node.
    Init {
        #[command(subcommand)]
        command: commands::init::InitCommands,
    },

    /// Snapshot export, verification, and apply.
    Snapshot {
        #[command(subcommand)]
        command: commands::snapshot::SnapshotCommands,
    },

    /// Schema fingerprinting and drift detection.
    Schema {
        #[command(subcommand)]
        command: commands::schema::SchemaCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::new().load()?;

    match cli.command {
        Commands::Init { command } => commands::init::run(config, command).await,
        Commands::Snapshot { command } => commands::snapshot::run(config, command).await,
        Commands::Schema { command } => commands::schema::run(config, command).await,
    }
}
