//! `steep snapshot` subcommands.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Subcommand;
use steep_config::SteepConfig;
use steep_snapshot::generate::SnapshotConfig;
use steep_snapshot::{SnapshotApplier, SnapshotGenerator, verify_snapshot};
use steep_types::{CompressionKind, NodeId, TracingSink};
use tokio_util::sync::CancellationToken;

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Export a snapshot of this node.
    Generate {
        /// Output root; defaults to the configured snapshot root.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Compression: none, gzip, lz4, zstd.
        #[arg(long)]
        compression: Option<String>,

        /// Export workers.
        #[arg(long)]
        workers: Option<u16>,
    },

    /// Verify a snapshot directory against its manifest.
    Verify {
        /// Snapshot directory (contains manifest.json).
        dir: PathBuf,
    },

    /// Apply a verified snapshot into this node.
    Apply {
        /// Snapshot directory (contains manifest.json).
        dir: PathBuf,
    },
}

pub async fn run(config: SteepConfig, command: SnapshotCommands) -> Result<()> {
    match command {
        SnapshotCommands::Generate {
            output,
            compression,
            workers,
        } => {
            let app = super::build(config).await?;
            let compression = match compression {
                Some(raw) => raw.parse::<CompressionKind>()?,
                None => app.config.snapshot.compression,
            };
            let generator = SnapshotGenerator::new(
                app.manager.pool().clone(),
                SnapshotConfig {
                    source_node: NodeId::new(app.config.node.id.clone()),
                    root_dir: output.unwrap_or_else(|| app.config.snapshot.root_dir.clone()),
                    compression,
                    parallel_workers: workers.unwrap_or(app.config.init.parallel_workers),
                    expires_at: None,
                    keep_slot: false,
                },
            );
            let manifest = generator
                .generate(&CancellationToken::new(), &TracingSink)
                .await?;
            println!(
                "snapshot {} complete: {} table(s), {} bytes at lsn {}",
                manifest.snapshot_id,
                manifest.tables.len(),
                manifest.total_size_bytes,
                manifest.lsn
            );
            Ok(())
        }

        SnapshotCommands::Verify { dir } => {
            let problems = verify_snapshot(&dir)?;
            if problems.is_empty() {
                println!("snapshot verified: all checksums match");
                Ok(())
            } else {
                for problem in &problems {
                    eprintln!("{problem}");
                }
                bail!("{} problem(s) found", problems.len());
            }
        }

        SnapshotCommands::Apply { dir } => {
            let app = super::build(config).await?;
            let applier = SnapshotApplier::new(app.manager.pool().clone(), dir);
            let report = applier.apply(&CancellationToken::new()).await?;
            println!(
                "applied {} table(s), {} row(s), {} sequence(s)",
                report.tables, report.rows, report.sequences
            );
            Ok(())
        }
    }
}
