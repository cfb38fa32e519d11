//! The snapshot initializer.
//!
//! Drives the engine's `copy_data = true` subscription flow: the engine
//! performs the initial copy and Steep watches per-relation sync states
//! until everything is ready, then waits out residual lag.

use async_trait::async_trait;
use steep_engine::catalog::{self, TableSize};
use steep_engine::meta;
use steep_engine::replication::{self, SubscriptionSpec};
use steep_engine::ident;
use steep_progress::eta_seconds;
use steep_types::{Event, InitOptions, InitState, LargeTableMethod, ProgressPhase};
use tokio::time::{Instant, sleep};

use crate::context::InitContext;
use crate::error::{InitError, Result};
use crate::initializer::MethodInitializer;
use crate::monitor::{CATCHUP_TIMEOUT, LAG_THRESHOLD_BYTES, POLL_INTERVAL};

/// Initializes a node via engine-driven initial copy.
#[derive(Debug)]
pub struct SnapshotInitializer;

#[async_trait]
impl MethodInitializer for SnapshotInitializer {
    async fn run(&self, ctx: &InitContext) -> Result<()> {
        meta::require_node(&ctx.local, &ctx.target).await?;
        meta::require_node(&ctx.local, &ctx.source).await?;

        ctx.state.transition(&ctx.target, InitState::Preparing).await?;
        meta::mark_init_started(&ctx.local, &ctx.target, &ctx.source).await?;
        ctx.progress.begin(&ctx.target).await?;

        let tables = catalog::list_user_tables(&ctx.source_pool).await?;
        check_large_tables(&tables, &ctx.options)?;
        let total_bytes: u64 = tables.iter().map(|t| t.size_bytes).sum();
        let baseline_bps = meta::get_node(&ctx.local, &ctx.target)
            .await?
            .and_then(|n| n.last_sync_throughput_bps);

        let publication = ident::publication_name(&ctx.source);
        replication::ensure_publication(&ctx.source_pool, &publication).await?;

        ctx.check_cancelled()?;
        ctx.state.transition(&ctx.target, InitState::Copying).await?;
        ctx.sink.emit(&Event::PhaseStarted {
            node: ctx.target.clone(),
            phase: "copying".to_string(),
        });
        ctx.progress
            .update(&ctx.target, |p| {
                p.phase = ProgressPhase::Copying;
                p.tables_total = tables.len() as u32;
                p.throughput_bps = baseline_bps;
                p.eta_seconds = baseline_bps.and_then(|bps| eta_seconds(total_bytes, bps));
            })
            .await?;

        let sub = ident::subscription_name(&ctx.target, &ctx.source);
        let spec = SubscriptionSpec {
            name: sub.clone(),
            conninfo: ctx.source_conninfo.clone(),
            publication,
            copy_data: true,
            create_slot: true,
            slot_name: None,
            streaming_parallel: ctx.options.parallel_workers > 1,
        };
        replication::create_subscription(&ctx.local, &spec).await?;

        let started = Instant::now();
        self.await_initial_copy(ctx, &sub, total_bytes, baseline_bps).await?;
        ctx.sink.emit(&Event::PhaseCompleted {
            node: ctx.target.clone(),
            phase: "copying".to_string(),
        });

        ctx.state
            .transition(&ctx.target, InitState::CatchingUp)
            .await?;
        ctx.progress
            .update(&ctx.target, |p| p.phase = ProgressPhase::CatchingUp)
            .await?;
        crate::monitor::await_caught_up(
            &ctx.local,
            &sub,
            1,
            LAG_THRESHOLD_BYTES,
            &ctx.cancel,
            CATCHUP_TIMEOUT,
        )
        .await?;

        ctx.state
            .transition(&ctx.target, InitState::Synchronized)
            .await?;
        meta::mark_init_completed(&ctx.local, &ctx.target).await?;

        // Persist the observed rate as the ETA baseline for next time.
        let elapsed = started.elapsed().as_secs().max(1);
        let observed_bps = total_bytes / elapsed;
        if observed_bps > 0 {
            meta::set_last_sync_throughput(&ctx.local, &ctx.target, observed_bps).await?;
        }
        ctx.progress.complete(&ctx.target).await?;
        Ok(())
    }
}

impl SnapshotInitializer {
    /// Polls per-relation sync states until all report ready, updating
    /// progress and emitting a `table_complete` per newly-ready relation.
    async fn await_initial_copy(
        &self,
        ctx: &InitContext,
        sub: &str,
        total_bytes: u64,
        baseline_bps: Option<u64>,
    ) -> Result<()> {
        let deadline = Instant::now() + CATCHUP_TIMEOUT;
        let mut reported_ready: Vec<String> = Vec::new();

        loop {
            ctx.check_cancelled()?;
            let states = replication::relation_sync_states(&ctx.local, sub).await?;
            let total = states.len();
            let ready: Vec<&replication::RelationSyncState> =
                states.iter().filter(|s| s.is_ready()).collect();

            for state in &ready {
                let qualified = format!("{}.{}", state.schema, state.table);
                if !reported_ready.contains(&qualified) {
                    let table = catalog::TableRef::new(&state.schema, &state.table);
                    let rows = catalog::table_row_count(&ctx.local, &table)
                        .await
                        .unwrap_or(0);
                    ctx.sink.emit(&Event::TableComplete {
                        node: ctx.target.clone(),
                        schema: state.schema.clone(),
                        table: state.table.clone(),
                        rows,
                    });
                    reported_ready.push(qualified);
                }
            }

            let done = ready.len();
            let fraction = if total == 0 {
                0.0
            } else {
                done as f64 / total as f64
            };
            let remaining = (total_bytes as f64 * (1.0 - fraction)) as u64;
            ctx.progress
                .update(&ctx.target, |p| {
                    p.tables_total = total as u32;
                    p.tables_completed = done as u32;
                    p.overall_percent = fraction * 90.0;
                    p.eta_seconds = baseline_bps.and_then(|bps| eta_seconds(remaining, bps));
                })
                .await?;

            if total > 0 && done == total {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(InitError::Timeout {
                    what: "initial table synchronization",
                    secs: CATCHUP_TIMEOUT.as_secs(),
                });
            }
            tokio::select! {
                () = ctx.cancel.cancelled() => return Err(InitError::Cancelled),
                () = sleep(POLL_INTERVAL) => {}
            }
        }
    }
}

/// Applies the large-table policy before any copy starts.
fn check_large_tables(tables: &[TableSize], options: &InitOptions) -> Result<()> {
    let Some(threshold) = options.large_table_threshold else {
        return Ok(());
    };
    for entry in tables.iter().filter(|t| t.size_bytes > threshold) {
        match options.large_table_method {
            LargeTableMethod::Copy => {
                tracing::warn!(
                    table = %entry.table,
                    size_bytes = entry.size_bytes,
                    threshold,
                    "table above large-table threshold; copying anyway"
                );
            }
            LargeTableMethod::Exclude => {
                return Err(InitError::LargeTable {
                    table: entry.table.to_string(),
                    size_bytes: entry.size_bytes,
                    threshold,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use steep_engine::TableRef;

    use super::*;

    fn sized(name: &str, size: u64) -> TableSize {
        TableSize {
            table: TableRef::new("public", name),
            size_bytes: size,
        }
    }

    #[test]
    fn no_threshold_accepts_everything() {
        let opts = InitOptions::default();
        check_large_tables(&[sized("huge", u64::MAX)], &opts).unwrap();
    }

    #[test]
    fn copy_method_warns_but_passes() {
        let mut opts = InitOptions::default();
        opts.large_table_threshold = Some(1000);
        opts.large_table_method = LargeTableMethod::Copy;
        check_large_tables(&[sized("big", 5000)], &opts).unwrap();
    }

    #[test]
    fn exclude_method_fails_fast() {
        let mut opts = InitOptions::default();
        opts.large_table_threshold = Some(1000);
        opts.large_table_method = LargeTableMethod::Exclude;
        let err = check_large_tables(&[sized("big", 5000)], &opts).unwrap_err();
        assert!(matches!(err, InitError::LargeTable { .. }));
    }
}
