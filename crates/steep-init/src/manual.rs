//! The manual (prepare/complete) initializer.
//!
//! Two-step flow for operator-driven backup and restore. `prepare` runs on
//! the source: it pins a consistent point with a logical slot and hands the
//! operator `{slot, lsn, expiry}` for their external backup tool.
//! `complete` runs on the target after the restore: schema is verified
//! before any state change, the prepared slot is consumed by a
//! `copy_data = false` subscription, and a catch-up monitor drives the node
//! to `synchronized`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use steep_engine::meta;
use steep_engine::replication::{self, SubscriptionSpec};
use steep_engine::{EngineError, ident};
use steep_schema::{DirectTransport, compare};
use steep_types::{Event, InitState, Lsn, NodeId, ProgressPhase, SchemaSyncMode};

use crate::context::InitContext;
use crate::error::{InitError, Result};
use crate::monitor::{self, CATCHUP_TIMEOUT, LAG_THRESHOLD_BYTES};

/// What `prepare` hands back to the operator.
#[derive(Debug, Clone)]
pub struct PrepareReceipt {
    /// Name of the created slot.
    pub slot_name: String,
    /// Consistent point the backup must correspond to.
    pub lsn: Lsn,
    /// When the slot record stops being available.
    pub expires_at: DateTime<Utc>,
}

/// Inputs to `complete`.
#[derive(Debug, Clone, Default)]
pub struct CompleteOptions {
    /// LSN of the restored backup; defaults to the most recent unexpired
    /// prepared slot for the source.
    pub source_lsn: Option<Lsn>,
    /// Prepared slot to bind; defaults to the recorded one.
    pub slot_name: Option<String>,
    /// Skip the schema fingerprint comparison.
    pub skip_schema_check: bool,
}

/// Creates a prepared init slot on the source node.
pub async fn prepare(
    pool: &PgPool,
    node: &NodeId,
    slot_name: Option<String>,
    ttl: Duration,
) -> Result<PrepareReceipt> {
    // A live bidirectional subscription slot means this node is already
    // streaming; a prepared slot would be orphaned the moment the operator
    // restored from it.
    let active = replication::active_slots_with_prefix(pool, "steep_sub_").await?;
    if let Some(slot) = active.into_iter().next() {
        return Err(EngineError::ReplicationActive {
            node: node.to_string(),
            slot,
        }
        .into());
    }

    let slot = slot_name.unwrap_or_else(|| ident::init_slot_name(node));
    if replication::slot_exists(pool, &slot).await? {
        return Err(EngineError::SlotExists(slot).into());
    }

    let lsn = replication::create_logical_slot(pool, &slot).await?;
    let expires_at = Utc::now()
        + chrono::Duration::from_std(ttl)
            .map_err(|_| InitError::Validation("slot ttl out of range".to_string()))?;
    meta::insert_slot(pool, &slot, node, lsn, expires_at).await?;

    tracing::info!(node = %node, slot, %lsn, %expires_at, "init slot prepared");
    Ok(PrepareReceipt {
        slot_name: slot,
        lsn,
        expires_at,
    })
}

/// Runs `complete` up to the catch-up phase.
///
/// Everything that can reject the request happens here, synchronously with
/// the caller: the schema check fails before any state transition so the
/// operator can fix and retry. On return the subscription exists and the
/// target is in `catching_up`.
pub async fn complete_setup(ctx: &InitContext, opts: &CompleteOptions) -> Result<()> {
    if !opts.skip_schema_check {
        verify_schema(ctx).await?;
    }

    ctx.state.transition(&ctx.target, InitState::Preparing).await?;
    meta::mark_init_started(&ctx.local, &ctx.target, &ctx.source).await?;
    ctx.progress.begin(&ctx.target).await?;

    let lsn = match opts.source_lsn {
        Some(lsn) => lsn,
        None => meta::latest_available_slot(&ctx.local, &ctx.source)
            .await?
            .map(|slot| slot.lsn)
            .ok_or_else(|| {
                InitError::Validation(format!(
                    "no LSN provided and no unexpired prepared slot for {}",
                    ctx.source
                ))
            })?,
    };
    tracing::debug!(target = %ctx.target, source = %ctx.source, %lsn, "restore point resolved");

    let conventional = ident::publication_name(&ctx.source);
    let publication = replication::discover_publication(&ctx.source_pool, &conventional)
        .await?
        .ok_or_else(|| EngineError::PublicationNotFound(ctx.source.to_string()))?;

    // Prefer the prepared slot; if it was dropped out-of-band, fall back
    // to an engine-created one at subscription create time.
    let recorded = match &opts.slot_name {
        Some(name) => meta::get_slot(&ctx.local, name).await?,
        None => meta::latest_available_slot(&ctx.local, &ctx.source).await?,
    };
    let slot_name = match &recorded {
        Some(record) if replication::slot_exists(&ctx.source_pool, &record.slot_name).await? => {
            Some(record.slot_name.clone())
        }
        Some(record) => {
            tracing::warn!(
                slot = %record.slot_name,
                "prepared slot no longer exists on source; engine will create one"
            );
            None
        }
        None => None,
    };

    let spec = SubscriptionSpec {
        name: ident::subscription_name(&ctx.target, &ctx.source),
        conninfo: ctx.source_conninfo.clone(),
        publication,
        copy_data: false,
        create_slot: slot_name.is_none(),
        slot_name: slot_name.clone(),
        streaming_parallel: false,
    };
    replication::create_subscription(&ctx.local, &spec).await?;

    if let Some(slot) = &slot_name {
        meta::mark_slot_used(&ctx.local, slot, &ctx.target).await?;
    }

    // Peer discovery symmetry; failure is not worth failing the init over.
    if let Err(e) = meta::register_node(
        &ctx.local,
        &ctx.source,
        None,
        Some(ctx.source_conninfo.as_str()),
    )
    .await
    {
        tracing::warn!(source = %ctx.source, error = %e, "source registration failed");
    }

    ctx.state
        .transition(&ctx.target, InitState::CatchingUp)
        .await?;
    ctx.progress
        .update(&ctx.target, |p| {
            p.phase = ProgressPhase::CatchingUp;
            p.overall_percent = 50.0;
        })
        .await?;
    Ok(())
}

/// Monitors catch-up after [`complete_setup`] and finishes the operation.
pub async fn monitor_catchup(ctx: &InitContext) -> Result<()> {
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
    ctx.progress.complete(&ctx.target).await?;
    Ok(())
}

async fn verify_schema(ctx: &InitContext) -> Result<()> {
    let transport = DirectTransport::new(ctx.source_pool.clone());
    let comparison = compare::compare(&ctx.local, &transport).await?;
    if comparison.is_match() {
        return Ok(());
    }

    let divergent = comparison.divergent_tables();
    ctx.sink.emit(&Event::SchemaMismatchDetected {
        node: ctx.target.clone(),
        peer: ctx.source.clone(),
        mismatched_tables: divergent.clone(),
    });
    match ctx.options.schema_sync {
        SchemaSyncMode::Strict => Err(InitError::SchemaMismatch(divergent)),
        SchemaSyncMode::Manual => {
            tracing::warn!(
                target = %ctx.target,
                source = %ctx.source,
                tables = divergent.len(),
                "schema mismatch; continuing per schema_sync=manual"
            );
            Ok(())
        }
        // Rejected by the manager before dispatch.
        SchemaSyncMode::Auto => Err(InitError::SchemaSyncAuto),
    }
}
