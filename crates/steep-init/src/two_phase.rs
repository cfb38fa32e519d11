//! The two-phase initializer.
//!
//! Phase one exports a snapshot from the source with the snapshot engine,
//! keeping the consistent-point slot alive. Phase two verifies and applies
//! the files into the target, then binds a `copy_data = false`
//! subscription to that slot so streaming resumes exactly at the export
//! LSN. Requires the snapshot root to be reachable from both nodes'
//! daemons (shared or transported storage).

use async_trait::async_trait;
use steep_engine::meta;
use steep_engine::replication::{self, SubscriptionSpec};
use steep_engine::ident;
use steep_snapshot::{SnapshotApplier, SnapshotGenerator};
use steep_snapshot::generate::SnapshotConfig;
use steep_types::{Event, InitState, ProgressPhase};
use tokio::time::Instant;

use crate::context::InitContext;
use crate::error::Result;
use crate::initializer::MethodInitializer;
use crate::monitor::{self, CATCHUP_TIMEOUT, LAG_THRESHOLD_BYTES};

/// Initializes a node from a snapshot-engine export.
#[derive(Debug)]
pub struct TwoPhaseInitializer;

#[async_trait]
impl MethodInitializer for TwoPhaseInitializer {
    async fn run(&self, ctx: &InitContext) -> Result<()> {
        meta::require_node(&ctx.local, &ctx.target).await?;
        meta::require_node(&ctx.local, &ctx.source).await?;

        ctx.state.transition(&ctx.target, InitState::Preparing).await?;
        meta::mark_init_started(&ctx.local, &ctx.target, &ctx.source).await?;
        ctx.progress.begin(&ctx.target).await?;
        let started = Instant::now();

        // Phase 1: export on the source, slot kept for phase 2.
        ctx.sink.emit(&Event::PhaseStarted {
            node: ctx.target.clone(),
            phase: "snapshot_export".to_string(),
        });
        let generator = SnapshotGenerator::new(
            ctx.source_pool.clone(),
            SnapshotConfig {
                source_node: ctx.source.clone(),
                root_dir: ctx.snapshot_root.clone(),
                compression: ctx.options.snapshot_compression,
                parallel_workers: ctx.options.parallel_workers,
                expires_at: None,
                keep_slot: true,
            },
        );
        let manifest = generator.generate(&ctx.cancel, ctx.sink.as_ref()).await?;
        ctx.sink.emit(&Event::PhaseCompleted {
            node: ctx.target.clone(),
            phase: "snapshot_export".to_string(),
        });

        // Phase 2: verify and replay into the target.
        ctx.check_cancelled()?;
        ctx.state.transition(&ctx.target, InitState::Copying).await?;
        ctx.progress
            .update(&ctx.target, |p| {
                p.phase = ProgressPhase::Copying;
                p.tables_total = manifest.tables.len() as u32;
            })
            .await?;

        let snapshot_dir = ctx.snapshot_root.join(manifest.snapshot_id.to_string());
        // The snapshot row lives on the source, where the export ran.
        let applier = SnapshotApplier::new(ctx.local.clone(), &snapshot_dir)
            .with_meta_pool(ctx.source_pool.clone());
        let report = applier.apply(&ctx.cancel).await?;
        ctx.progress
            .update(&ctx.target, |p| {
                p.tables_completed = report.tables as u32;
                p.rows_copied = report.rows;
                p.bytes_copied = report.bytes;
                p.overall_percent = 80.0;
            })
            .await?;

        // Stream changes made since the export LSN over the kept slot.
        let publication = ident::publication_name(&ctx.source);
        replication::ensure_publication(&ctx.source_pool, &publication).await?;
        let slot = ident::snapshot_slot_name(&manifest.snapshot_id.to_string());
        let spec = SubscriptionSpec {
            name: ident::subscription_name(&ctx.target, &ctx.source),
            conninfo: ctx.source_conninfo.clone(),
            publication,
            copy_data: false,
            create_slot: false,
            slot_name: Some(slot),
            streaming_parallel: false,
        };
        replication::create_subscription(&ctx.local, &spec).await?;

        ctx.state
            .transition(&ctx.target, InitState::CatchingUp)
            .await?;
        ctx.progress
            .update(&ctx.target, |p| p.phase = ProgressPhase::CatchingUp)
            .await?;
        let sub = ident::subscription_name(&ctx.target, &ctx.source);
        monitor::await_caught_up(
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
        let elapsed = started.elapsed().as_secs().max(1);
        let observed_bps = report.bytes / elapsed;
        if observed_bps > 0 {
            meta::set_last_sync_throughput(&ctx.local, &ctx.target, observed_bps).await?;
        }
        ctx.progress.complete(&ctx.target).await?;
        Ok(())
    }
}
