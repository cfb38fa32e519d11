//! The reinitializer.
//!
//! Full mode wipes the node back to `uninitialized`: subscriptions
//! dropped, every user table truncated under the `steep_reinit` session
//! origin (so peers with `origin = none` subscriptions never see the
//! truncates), progress cleared. Scoped mode recopies a subset of tables
//! through the existing subscriptions by resetting their per-relation sync
//! state.

use std::sync::Arc;

use sqlx::PgPool;
use steep_engine::catalog::{self, TableRef};
use steep_engine::meta;
use steep_engine::{ident, replication};
use steep_progress::{Ewma, ProgressTracker, eta_seconds};
use steep_types::{Event, EventSink, InitState, NodeId, ProgressPhase};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::error::{InitError, Result};
use crate::monitor::{CATCHUP_TIMEOUT, POLL_INTERVAL};
use crate::state::StateStore;

/// Scope of a reinitialization.
#[derive(Debug, Clone)]
pub enum ReinitMode {
    /// Wipe everything and reset to `uninitialized`.
    Full,
    /// Recopy the given tables through existing subscriptions.
    Scoped { tables: Vec<String> },
}

/// Outcome of a full reinitialization.
#[derive(Debug, Clone, Copy)]
pub struct ReinitReport {
    /// Subscriptions dropped.
    pub subscriptions_dropped: usize,
    /// User tables truncated.
    pub tables_affected: usize,
}

/// Repairs a node that diverged from its peers.
pub struct Reinitializer {
    pool: PgPool,
    node: NodeId,
    state: StateStore,
    progress: Arc<ProgressTracker>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl Reinitializer {
    /// Creates a reinitializer for the local node.
    pub fn new(
        pool: PgPool,
        node: NodeId,
        state: StateStore,
        progress: Arc<ProgressTracker>,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            node,
            state,
            progress,
            sink,
            cancel,
        }
    }

    /// Runs a full reinitialization.
    pub async fn full(&self) -> Result<ReinitReport> {
        let prefix = ident::subscription_prefix(&self.node);
        let subs = replication::subscriptions_with_prefix(&self.pool, &prefix).await?;
        for sub in &subs {
            replication::drop_subscription(&self.pool, sub, false).await?;
        }

        let tables: Vec<TableRef> = catalog::list_user_tables(&self.pool)
            .await?
            .into_iter()
            .map(|t| t.table)
            .collect();
        let truncated = truncate_under_origin(&self.pool, &tables).await?;

        self.progress.clear(&self.node).await?;
        // Wiping a node is a reset, not a lifecycle transition.
        self.state.reset(&self.node, InitState::Uninitialized).await?;

        tracing::info!(
            node = %self.node,
            subscriptions = subs.len(),
            tables = truncated,
            "full reinitialization complete"
        );
        Ok(ReinitReport {
            subscriptions_dropped: subs.len(),
            tables_affected: truncated,
        })
    }

    /// Runs a scoped reinitialization over the given tables.
    pub async fn scoped(&self, table_names: &[String]) -> Result<()> {
        let tables = table_names
            .iter()
            .map(|t| TableRef::parse(t))
            .collect::<steep_engine::Result<Vec<_>>>()?;
        if tables.is_empty() {
            return Err(InitError::Validation(
                "scoped reinit requires at least one table".to_string(),
            ));
        }

        // From synchronized the machine routes through diverged.
        if self.state.current(&self.node).await? == InitState::Synchronized {
            self.state.transition(&self.node, InitState::Diverged).await?;
        }
        self.state
            .transition(&self.node, InitState::Reinitializing)
            .await?;
        self.progress.begin(&self.node).await?;

        let prefix = ident::subscription_prefix(&self.node);
        let subs = replication::subscriptions_with_prefix(&self.pool, &prefix).await?;
        if subs.is_empty() {
            return Err(InitError::Validation(format!(
                "node {} has no subscriptions to reinitialize through",
                self.node
            )));
        }

        // Subscription disable is engine-level all-or-nothing.
        for sub in &subs {
            replication::set_subscription_enabled(&self.pool, sub, false).await?;
        }
        truncate_under_origin(&self.pool, &tables).await?;
        for sub in &subs {
            replication::reset_relation_sync_state(&self.pool, sub, &tables).await?;
        }
        for sub in &subs {
            replication::set_subscription_enabled(&self.pool, sub, true).await?;
        }

        self.progress
            .update(&self.node, |p| {
                p.phase = ProgressPhase::Copying;
                p.tables_total = tables.len() as u32;
            })
            .await?;
        let observed_bps = self.monitor_recopy(&subs, &tables).await?;

        self.state
            .transition(&self.node, InitState::Synchronized)
            .await?;
        if let Some(bps) = observed_bps {
            meta::set_last_sync_throughput(&self.pool, &self.node, bps).await?;
        }
        self.progress.complete(&self.node).await?;
        tracing::info!(node = %self.node, tables = tables.len(), "scoped reinitialization complete");
        Ok(())
    }

    /// Watches per-relation readiness and engine COPY progress until every
    /// targeted table reports ready. Returns the EWMA-smoothed throughput.
    async fn monitor_recopy(&self, subs: &[String], tables: &[TableRef]) -> Result<Option<u64>> {
        let deadline = Instant::now() + CATCHUP_TIMEOUT;
        let targeted: Vec<String> = tables.iter().map(ToString::to_string).collect();
        let mut ewma = match meta::get_node(&self.pool, &self.node).await? {
            Some(node) => match node.last_sync_throughput_bps {
                Some(bps) => Ewma::seed(0.3, bps as f64),
                None => Ewma::default(),
            },
            None => Ewma::default(),
        };
        let mut last_bytes: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(InitError::Cancelled);
            }

            let mut ready = 0usize;
            for sub in subs {
                let states = replication::relation_sync_states(&self.pool, sub).await?;
                ready += states
                    .iter()
                    .filter(|s| {
                        s.is_ready() && targeted.contains(&format!("{}.{}", s.schema, s.table))
                    })
                    .count();
            }

            let copies = replication::copy_progress(&self.pool).await?;
            let bytes_processed: u64 = copies.iter().map(|c| c.bytes_processed).sum();
            let bytes_total: u64 = copies.iter().map(|c| c.bytes_total).sum();
            let tuples: u64 = copies.iter().map(|c| c.tuples_processed).sum();

            let interval_bytes = bytes_processed.saturating_sub(last_bytes);
            last_bytes = bytes_processed;
            let sample_bps = interval_bytes as f64 / POLL_INTERVAL.as_secs_f64();
            let bps = ewma.update(sample_bps) as u64;
            let eta = eta_seconds(bytes_total.saturating_sub(bytes_processed), bps.max(1));

            self.progress
                .update(&self.node, |p| {
                    p.tables_completed = ready as u32;
                    p.rows_copied = tuples;
                    p.bytes_copied = bytes_processed;
                    p.throughput_bps = Some(bps);
                    p.eta_seconds = eta;
                    p.overall_percent = if targeted.is_empty() {
                        0.0
                    } else {
                        ready as f64 / targeted.len() as f64 * 100.0
                    };
                })
                .await?;

            if ready >= targeted.len() {
                return Ok(ewma.value().map(|v| v as u64).filter(|v| *v > 0));
            }
            if Instant::now() >= deadline {
                self.sink.emit(&Event::ReinitTimeout {
                    node: self.node.clone(),
                    waited_secs: CATCHUP_TIMEOUT.as_secs(),
                });
                return Err(InitError::Timeout {
                    what: "scoped reinitialization",
                    secs: CATCHUP_TIMEOUT.as_secs(),
                });
            }
            tokio::select! {
                () = self.cancel.cancelled() => return Err(InitError::Cancelled),
                () = sleep(POLL_INTERVAL) => {}
            }
        }
    }
}

/// Truncates tables on a dedicated session tagged with the reinit origin.
///
/// The origin tag makes the truncates carry a replication origin, so
/// `origin = none` subscriptions on peers filter them exactly like any
/// other replicated change.
async fn truncate_under_origin(pool: &PgPool, tables: &[TableRef]) -> Result<usize> {
    if tables.is_empty() {
        return Ok(0);
    }
    let mut conn = pool.acquire().await?.detach();
    replication::setup_session_origin(&mut conn, ident::REINIT_ORIGIN).await?;

    let list = tables
        .iter()
        .map(TableRef::quoted)
        .collect::<Vec<_>>()
        .join(", ");
    let result = sqlx::query(&format!("TRUNCATE {list} CASCADE"))
        .execute(&mut conn)
        .await;

    // Clear the session association even when the truncate failed; the
    // connection is dedicated but releasing the origin keeps the failure
    // path tidy if the session lingers.
    if let Err(e) = replication::reset_session_origin(&mut conn).await {
        tracing::warn!(error = %e, "failed to reset session origin");
    }
    result?;
    Ok(tables.len())
}
