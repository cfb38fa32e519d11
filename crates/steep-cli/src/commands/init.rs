//! `steep init` subcommands.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Subcommand;
use steep_config::SteepConfig;
use steep_init::{CompleteOptions, ReinitMode, ReinitOutcome};
use steep_types::{InitMethod, Lsn, MergeOptions, NodeId};

use super::App;

#[derive(Subcommand)]
pub enum InitCommands {
    /// Start initializing this node from a source peer.
    Start {
        /// Source node id.
        #[arg(long)]
        source: String,

        /// Initialization method.
        #[arg(long, default_value = "snapshot")]
        method: String,

        /// Parallel workers for the initial copy.
        #[arg(long)]
        workers: Option<u16>,

        /// Tables to merge (bidirectional-merge only), schema-qualified.
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,

        /// Conflict strategy (bidirectional-merge only).
        #[arg(long, default_value = "prefer-node-a")]
        strategy: String,

        /// Remote connection string (bidirectional-merge only).
        #[arg(long)]
        remote: Option<String>,

        /// Analyze only; change nothing (bidirectional-merge only).
        #[arg(long)]
        dry_run: bool,

        /// Stream progress until the operation finishes.
        #[arg(long)]
        follow: bool,
    },

    /// Cancel the live operation on this node.
    Cancel,

    /// Prepare a replication slot on this (source) node for an external
    /// backup.
    Prepare {
        /// Slot name; defaults to the convention for this node.
        #[arg(long)]
        slot: Option<String>,

        /// Slot availability window in seconds.
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },

    /// Complete a manual initialization on this (target) node.
    Complete {
        /// Source node id.
        #[arg(long)]
        source: String,

        /// LSN of the restored backup.
        #[arg(long)]
        lsn: Option<String>,

        /// Prepared slot to bind.
        #[arg(long)]
        slot: Option<String>,

        /// Skip the schema fingerprint comparison.
        #[arg(long)]
        skip_schema_check: bool,
    },

    /// Show or follow initialization progress.
    Progress {
        /// Node id; defaults to the local node.
        #[arg(long)]
        node: Option<String>,

        /// Keep streaming updates until the operation finishes.
        #[arg(long)]
        follow: bool,
    },

    /// Reinitialize this node.
    Reinit {
        /// Wipe everything and reset to uninitialized.
        #[arg(long, conflicts_with = "tables")]
        full: bool,

        /// Recopy only these tables, schema-qualified.
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },
}

pub async fn run(config: SteepConfig, command: InitCommands) -> Result<()> {
    let app = super::build(config).await?;
    match command {
        InitCommands::Start {
            source,
            method,
            workers,
            tables,
            strategy,
            remote,
            dry_run,
            follow,
        } => {
            let method: InitMethod = method.parse()?;
            let mut options = app.config.init_options();
            options.method = method;
            options.dry_run = dry_run;
            if let Some(workers) = workers {
                options.parallel_workers = workers;
            }
            if method == InitMethod::BidirectionalMerge {
                options.merge = Some(MergeOptions {
                    tables,
                    strategy,
                    remote_conninfo: remote,
                });
            }

            let target = app.manager.local_node().clone();
            app.manager
                .start_init(target.clone(), NodeId::new(source), options)
                .await?;
            println!("initialization of {target} dispatched");
            if follow {
                follow_progress(&app, &target).await?;
            }
            Ok(())
        }

        InitCommands::Cancel => {
            let node = app.manager.local_node().clone();
            app.manager.cancel_init(&node)?;
            println!("cancellation signalled for {node}");
            Ok(())
        }

        InitCommands::Prepare { slot, ttl_secs } => {
            let receipt = app
                .manager
                .prepare_init(slot, Duration::from_secs(ttl_secs))
                .await?;
            println!("slot:       {}", receipt.slot_name);
            println!("lsn:        {}", receipt.lsn);
            println!("expires at: {}", receipt.expires_at.to_rfc3339());
            Ok(())
        }

        InitCommands::Complete {
            source,
            lsn,
            slot,
            skip_schema_check,
        } => {
            let source_lsn = lsn.map(|raw| raw.parse::<Lsn>()).transpose()?;
            let options = app.config.init_options();
            app.manager
                .complete_init(
                    NodeId::new(source),
                    options,
                    CompleteOptions {
                        source_lsn,
                        slot_name: slot,
                        skip_schema_check,
                    },
                )
                .await?;
            println!("manual initialization dispatched; catch-up continues in background");
            Ok(())
        }

        InitCommands::Progress { node, follow } => {
            let node = node.map_or_else(|| app.manager.local_node().clone(), NodeId::new);
            match app.manager.get_progress(&node).await? {
                Some(progress) => println!("{}", serde_json::to_string_pretty(&progress)?),
                None => println!("no progress recorded for {node}"),
            }
            if follow {
                follow_progress(&app, &node).await?;
            }
            Ok(())
        }

        InitCommands::Reinit { full, tables } => {
            let mode = if full {
                ReinitMode::Full
            } else if !tables.is_empty() {
                ReinitMode::Scoped { tables }
            } else {
                bail!("pass --full or --tables");
            };
            match app.manager.start_reinit(mode).await? {
                ReinitOutcome::Full(report) => {
                    println!(
                        "full reinit complete: {} subscription(s) dropped, {} table(s) truncated",
                        report.subscriptions_dropped, report.tables_affected
                    );
                }
                ReinitOutcome::ScopedStarted => {
                    println!("scoped reinit dispatched; follow with `steep init progress --follow`");
                }
            }
            Ok(())
        }
    }
}

/// Streams progress lines for `node` until a terminal phase.
async fn follow_progress(app: &App, node: &NodeId) -> Result<()> {
    let mut stream = app.manager.progress_stream();
    loop {
        match stream.recv().await {
            Ok(progress) if &progress.node == node => {
                println!(
                    "{} {:>5.1}%  tables {}/{}  {}",
                    progress.phase,
                    progress.overall_percent,
                    progress.tables_completed,
                    progress.tables_total,
                    progress
                        .current_table
                        .as_deref()
                        .unwrap_or(""),
                );
                if progress.is_terminal() {
                    if let Some(error) = progress.error {
                        bail!("operation failed: {error}");
                    }
                    return Ok(());
                }
            }
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress stream lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}
