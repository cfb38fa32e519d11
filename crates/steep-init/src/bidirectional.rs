//! The bidirectional-merge initializer.
//!
//! Converges two already-populated nodes with the merge engine, then wires
//! publications and `origin = none` subscriptions in both directions. The
//! `origin = none` option is what keeps a change from riding the cycle
//! A→B→A forever; every subscription created here sets it.

use std::time::Duration;

use async_trait::async_trait;
use steep_engine::meta;
use steep_engine::replication::{self, SubscriptionSpec};
use steep_engine::{TableRef, ident};
use steep_merge::{ConflictStrategy, MergeConfig, MergeExecutor};
use steep_types::{InitState, MergeOptions, ProgressPhase};

use crate::context::InitContext;
use crate::error::{InitError, Result};
use crate::initializer::MethodInitializer;
use crate::monitor::{self, CATCHUP_TIMEOUT, LAG_THRESHOLD_BYTES};

/// Initializes bidirectional replication between two populated nodes.
#[derive(Debug)]
pub struct BidirectionalMergeInitializer;

#[async_trait]
impl MethodInitializer for BidirectionalMergeInitializer {
    async fn run(&self, ctx: &InitContext) -> Result<()> {
        let merge_opts = ctx.options.merge.as_ref().ok_or_else(|| {
            InitError::Validation("bidirectional-merge requires merge options".to_string())
        })?;
        let (tables, strategy) = parse_merge_options(merge_opts)?;

        // A dry run is pure analysis: no state transitions, no artifacts.
        if ctx.options.dry_run {
            let summary = self.execute_merge(ctx, tables, strategy).await?;
            tracing::info!(
                merge_id = %summary.merge_id,
                conflicts = summary.total_conflicts(),
                converged = summary.already_converged(),
                "dry-run merge analysis complete"
            );
            return Ok(());
        }

        ctx.state.transition(&ctx.target, InitState::Preparing).await?;
        meta::mark_init_started(&ctx.local, &ctx.target, &ctx.source).await?;
        ctx.progress.begin(&ctx.target).await?;

        let summary = self.execute_merge(ctx, tables, strategy).await?;
        tracing::info!(
            merge_id = %summary.merge_id,
            conflicts = summary.total_conflicts(),
            transferred = summary.total_transferred(),
            unresolved = summary.conflict_reports.len(),
            "merge complete"
        );
        ctx.progress
            .update(&ctx.target, |p| {
                p.phase = ProgressPhase::Copying;
                p.tables_total = summary.tables.len() as u32;
                p.tables_completed = summary.tables.len() as u32;
                p.rows_copied = summary.total_transferred();
                p.overall_percent = 80.0;
            })
            .await?;

        // Publications and subscriptions in both directions.
        ctx.check_cancelled()?;
        let local_pub = ident::publication_name(&ctx.target);
        let remote_pub = ident::publication_name(&ctx.source);
        replication::ensure_publication(&ctx.local, &local_pub).await?;
        replication::ensure_publication(&ctx.source_pool, &remote_pub).await?;

        let local_sub = SubscriptionSpec {
            name: ident::subscription_name(&ctx.target, &ctx.source),
            conninfo: ctx.source_conninfo.clone(),
            publication: remote_pub,
            copy_data: false,
            create_slot: true,
            slot_name: None,
            streaming_parallel: false,
        };
        replication::create_subscription(&ctx.local, &local_sub).await?;

        let remote_sub = SubscriptionSpec {
            name: ident::subscription_name(&ctx.source, &ctx.target),
            conninfo: ctx.local_conninfo.clone(),
            publication: local_pub,
            copy_data: false,
            create_slot: true,
            slot_name: None,
            streaming_parallel: false,
        };
        replication::create_subscription(&ctx.source_pool, &remote_sub).await?;

        ctx.state
            .transition(&ctx.target, InitState::CatchingUp)
            .await?;
        monitor::await_caught_up(
            &ctx.local,
            &local_sub.name,
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
        ctx.progress.complete(&ctx.target).await?;
        Ok(())
    }
}

impl BidirectionalMergeInitializer {
    async fn execute_merge(
        &self,
        ctx: &InitContext,
        tables: Vec<TableRef>,
        strategy: ConflictStrategy,
    ) -> Result<steep_merge::MergeSummary> {
        let mut config = MergeConfig::new(
            ctx.target.clone(),
            ctx.source.clone(),
            tables,
            strategy,
        );
        config.quiesce_timeout = Duration::from_millis(ctx.options.quiesce_timeout_ms);
        config.dry_run = ctx.options.dry_run;

        let executor = MergeExecutor::new(ctx.local.clone(), ctx.source_pool.clone(), config);
        Ok(executor.execute(&ctx.cancel).await?)
    }
}

fn parse_merge_options(opts: &MergeOptions) -> Result<(Vec<TableRef>, ConflictStrategy)> {
    if opts.tables.is_empty() {
        return Err(InitError::Validation(
            "bidirectional-merge requires at least one table".to_string(),
        ));
    }
    let tables = opts
        .tables
        .iter()
        .map(|t| TableRef::parse(t))
        .collect::<steep_engine::Result<Vec<_>>>()?;
    let strategy: ConflictStrategy = opts.strategy.parse()?;
    Ok((tables, strategy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_options_parse() {
        let opts = MergeOptions {
            tables: vec!["public.orders".to_string(), "inventory".to_string()],
            strategy: "prefer-node-a".to_string(),
            remote_conninfo: None,
        };
        let (tables, strategy) = parse_merge_options(&opts).unwrap();
        assert_eq!(tables[0], TableRef::new("public", "orders"));
        assert_eq!(tables[1], TableRef::new("public", "inventory"));
        assert_eq!(strategy, ConflictStrategy::PreferNodeA);
    }

    #[test]
    fn empty_tables_rejected() {
        let opts = MergeOptions {
            tables: Vec::new(),
            strategy: "manual".to_string(),
            remote_conninfo: None,
        };
        assert!(parse_merge_options(&opts).is_err());
    }

    #[test]
    fn unknown_strategy_rejected() {
        let opts = MergeOptions {
            tables: vec!["public.orders".to_string()],
            strategy: "newest-wins".to_string(),
            remote_conninfo: None,
        };
        assert!(parse_merge_options(&opts).is_err());
    }
}
