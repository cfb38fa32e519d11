//! `steep schema` subcommands.

use anyhow::{Result, bail};
use clap::Subcommand;
use steep_config::SteepConfig;
use steep_engine::EnginePool;
use steep_schema::{DirectTransport, TableStatus, compare, fingerprint};
use steep_types::NodeId;

#[derive(Subcommand)]
pub enum SchemaCommands {
    /// Capture fingerprints of every user table on this node.
    Capture,

    /// Compare this node's schema against a peer.
    Compare {
        /// Peer connection string.
        #[arg(long)]
        peer: String,

        /// Exit non-zero on any difference.
        #[arg(long)]
        strict: bool,
    },
}

pub async fn run(config: SteepConfig, command: SchemaCommands) -> Result<()> {
    let app = super::build(config).await?;
    match command {
        SchemaCommands::Capture => {
            let node = NodeId::new(app.config.node.id.clone());
            let captured = fingerprint::capture(app.manager.pool(), &node).await?;
            println!("captured fingerprints for {captured} table(s)");
            Ok(())
        }

        SchemaCommands::Compare { peer, strict } => {
            let remote = EnginePool::connect_default(&peer).await?;
            let transport = DirectTransport::new(remote.inner().clone());
            let comparison = compare::compare(app.manager.pool(), &transport).await?;

            for table in &comparison.tables {
                let status = match table.status {
                    TableStatus::Match => "match",
                    TableStatus::Mismatch => "MISMATCH",
                    TableStatus::LocalOnly => "local only",
                    TableStatus::RemoteOnly => "remote only",
                };
                println!("{:<40} {status}", table.table);
            }
            println!(
                "{} matched, {} mismatched, {} local-only, {} remote-only",
                comparison.matched,
                comparison.mismatched,
                comparison.local_only,
                comparison.remote_only
            );

            if strict && !comparison.is_match() {
                bail!("schemas differ");
            }
            Ok(())
        }
    }
}
