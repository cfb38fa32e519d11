//! The Init Manager.
//!
//! Single entry point for the initialization subsystem: serializes
//! lifecycle per node, routes requests to method initializers, multiplexes
//! progress, and owns cancellation. Operations run in background tasks
//! holding a child of the manager's cancellation token, so they survive
//! the caller that started them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::PgPool;
use steep_engine::{EnginePool, meta};
use steep_progress::ProgressTracker;
use steep_types::{
    Event, EventSink, InitMethod, InitOptions, InitProgress, InitState, NodeId, SchemaSyncMode,
};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::context::InitContext;
use crate::error::{InitError, Result};
use crate::initializer::initializer_for;
use crate::manual::{self, CompleteOptions, PrepareReceipt};
use crate::operation::{Operation, OperationKind};
use crate::reinit::{ReinitMode, ReinitReport, Reinitializer};
use crate::state::StateStore;

/// Static configuration of the manager's node.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Id of the node this daemon runs on.
    pub local_node: NodeId,
    /// Connection string peers use to reach this node.
    pub local_conninfo: String,
    /// Root directory for snapshot exports.
    pub snapshot_root: PathBuf,
}

/// Outcome of `start_reinit`.
#[derive(Debug, Clone, Copy)]
pub enum ReinitOutcome {
    /// Full reinit ran to completion inline.
    Full(ReinitReport),
    /// Scoped reinit was dispatched; progress streams report the rest.
    ScopedStarted,
}

struct Inner {
    pool: PgPool,
    config: ManagerConfig,
    sink: Arc<dyn EventSink>,
    progress: Arc<ProgressTracker>,
    state: StateStore,
    active: Mutex<HashMap<NodeId, Operation>>,
}

/// The initialization manager.
#[derive(Clone)]
pub struct InitManager {
    inner: Arc<Inner>,
}

impl InitManager {
    /// Creates a manager over the local node's pool, ensuring the `steep`
    /// namespace exists and the local node is registered.
    pub async fn new(
        pool: PgPool,
        config: ManagerConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        meta::ensure_schema(&pool).await?;
        meta::register_node(
            &pool,
            &config.local_node,
            None,
            Some(config.local_conninfo.as_str()),
        )
        .await?;

        let progress = Arc::new(ProgressTracker::new(pool.clone()));
        let state = StateStore::new(pool.clone(), Arc::clone(&sink));
        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                config,
                sink,
                progress,
                state,
                active: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// The local node id.
    pub fn local_node(&self) -> &NodeId {
        &self.inner.config.local_node
    }

    /// The local metadata pool.
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Starts an initialization of `target` from `source`.
    ///
    /// Returns once the operation is dispatched; completion is observed
    /// through progress and events. Fails with `AlreadyActive` when an
    /// operation is live for the target.
    pub async fn start_init(
        &self,
        target: NodeId,
        source: NodeId,
        options: InitOptions,
    ) -> Result<()> {
        options.validate()?;
        if options.schema_sync == SchemaSyncMode::Auto {
            return Err(InitError::SchemaSyncAuto);
        }
        let initializer = initializer_for(options.method)?;
        if target != self.inner.config.local_node {
            return Err(InitError::Validation(format!(
                "target {target} is not this daemon's node {}",
                self.inner.config.local_node
            )));
        }

        // The initializer performs the transition; reject requests that
        // could never enter `preparing` before registering anything.
        let current = self.inner.state.current(&target).await?;
        if !current.can_transition_to(InitState::Preparing) {
            return Err(InitError::InvalidTransition {
                node: target,
                from: current,
                to: InitState::Preparing,
            });
        }

        let op = self
            .inner
            .register(&target, OperationKind::Init(options.method))?;

        let (source_pool, source_conninfo) = match self.resolve_source(&source, &options).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.inner.unregister(&target);
                return Err(e);
            }
        };

        self.inner.sink.emit(&Event::InitStarted {
            node: target.clone(),
            source: Some(source.clone()),
            method: options.method,
        });

        let ctx = InitContext {
            target: target.clone(),
            source,
            local: self.inner.pool.clone(),
            source_pool,
            source_conninfo,
            local_conninfo: self.inner.config.local_conninfo.clone(),
            snapshot_root: self.inner.config.snapshot_root.clone(),
            options,
            state: self.inner.state.clone(),
            progress: Arc::clone(&self.inner.progress),
            sink: Arc::clone(&self.inner.sink),
            cancel: op.cancel.child_token(),
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let started = Instant::now();
            let result = initializer.run(&ctx).await;
            inner.finish(&ctx.target, started.elapsed(), result).await;
        });
        Ok(())
    }

    /// Signals cancellation of the node's live operation.
    ///
    /// Returns immediately; the operation observes the signal at its next
    /// suspension point and unwinds with best-effort cleanup.
    pub fn cancel_init(&self, node: &NodeId) -> Result<()> {
        {
            let active = self.inner.active.lock().unwrap_or_else(|e| e.into_inner());
            let op = active
                .get(node)
                .ok_or_else(|| InitError::NoActiveOp(node.clone()))?;
            op.cancel.cancel();
        }
        tracing::info!(node = %node, "initialization cancellation requested");
        self.inner
            .sink
            .emit(&Event::InitCancelled { node: node.clone() });
        Ok(())
    }

    /// Prepares an init slot on this (source) node for an external backup.
    pub async fn prepare_init(
        &self,
        slot_name: Option<String>,
        ttl: Duration,
    ) -> Result<PrepareReceipt> {
        manual::prepare(
            &self.inner.pool,
            &self.inner.config.local_node,
            slot_name,
            ttl,
        )
        .await
    }

    /// Completes a manual initialization on this (target) node.
    ///
    /// Validation, the schema check, and subscription creation run
    /// synchronously so the caller sees rejections immediately; the
    /// catch-up monitor continues in the background.
    pub async fn complete_init(
        &self,
        source: NodeId,
        options: InitOptions,
        complete: CompleteOptions,
    ) -> Result<()> {
        options.validate()?;
        if options.schema_sync == SchemaSyncMode::Auto {
            return Err(InitError::SchemaSyncAuto);
        }
        let target = self.inner.config.local_node.clone();
        let op = self
            .inner
            .register(&target, OperationKind::Init(InitMethod::Manual))?;

        let (source_pool, source_conninfo) = match self.resolve_source(&source, &options).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.inner.unregister(&target);
                return Err(e);
            }
        };

        self.inner.sink.emit(&Event::InitStarted {
            node: target.clone(),
            source: Some(source.clone()),
            method: InitMethod::Manual,
        });

        let ctx = InitContext {
            target: target.clone(),
            source,
            local: self.inner.pool.clone(),
            source_pool,
            source_conninfo,
            local_conninfo: self.inner.config.local_conninfo.clone(),
            snapshot_root: self.inner.config.snapshot_root.clone(),
            options,
            state: self.inner.state.clone(),
            progress: Arc::clone(&self.inner.progress),
            sink: Arc::clone(&self.inner.sink),
            cancel: op.cancel.child_token(),
        };
        let started = Instant::now();

        if let Err(e) = manual::complete_setup(&ctx, &complete).await {
            // A rejection before any state change leaves the node in its
            // prior state for a clean retry; later failures mark it.
            if !matches!(
                e,
                InitError::SchemaMismatch(_)
                    | InitError::Validation(_)
                    | InitError::SchemaSyncAuto
            ) {
                self.inner.state.try_fail(&target).await;
                let _ = self.inner.progress.fail(&target, &e.to_string()).await;
            }
            self.inner.progress.release(&target);
            self.inner.unregister(&target);
            return Err(e);
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = manual::monitor_catchup(&ctx).await;
            inner.finish(&ctx.target, started.elapsed(), result).await;
        });
        Ok(())
    }

    /// Starts a reinitialization of the local node.
    ///
    /// Full mode runs inline and returns its report; scoped mode is
    /// dispatched like an init operation.
    pub async fn start_reinit(&self, mode: ReinitMode) -> Result<ReinitOutcome> {
        let target = self.inner.config.local_node.clone();
        let op = self.inner.register(&target, OperationKind::Reinit)?;
        let reinit = Reinitializer::new(
            self.inner.pool.clone(),
            target.clone(),
            self.inner.state.clone(),
            Arc::clone(&self.inner.progress),
            Arc::clone(&self.inner.sink),
            op.cancel.child_token(),
        );

        match mode {
            ReinitMode::Full => {
                let result = reinit.full().await;
                self.inner.unregister(&target);
                result.map(ReinitOutcome::Full)
            }
            ReinitMode::Scoped { tables } => {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result = reinit.scoped(&tables).await;
                    inner.finish(&target, started.elapsed(), result).await;
                });
                Ok(ReinitOutcome::ScopedStarted)
            }
        }
    }

    /// Applies a validated state transition on behalf of the operator.
    pub async fn update_state(&self, node: &NodeId, new_state: InitState) -> Result<()> {
        self.inner.state.transition(node, new_state).await
    }

    /// Point-reads a node's progress.
    pub async fn get_progress(&self, node: &NodeId) -> Result<Option<InitProgress>> {
        Ok(self.inner.progress.get(node).await?)
    }

    /// Subscribes to the progress stream.
    pub fn progress_stream(&self) -> broadcast::Receiver<InitProgress> {
        self.inner.progress.subscribe()
    }

    /// The live operation for a node, if any.
    pub fn active_operation(&self, node: &NodeId) -> Option<Operation> {
        let active = self.inner.active.lock().unwrap_or_else(|e| e.into_inner());
        active.get(node).cloned()
    }

    /// Resolves the source node's pool: an explicit conninfo from merge
    /// options wins, else the registered endpoint.
    async fn resolve_source(
        &self,
        source: &NodeId,
        options: &InitOptions,
    ) -> Result<(PgPool, String)> {
        let conninfo = match options
            .merge
            .as_ref()
            .and_then(|m| m.remote_conninfo.clone())
        {
            Some(conninfo) => {
                meta::register_node(&self.inner.pool, source, None, Some(conninfo.as_str()))
                    .await?;
                conninfo
            }
            None => meta::require_node(&self.inner.pool, source)
                .await?
                .endpoint
                .ok_or_else(|| {
                    InitError::Validation(format!("node {source} has no registered endpoint"))
                })?,
        };
        let engine = EnginePool::connect_default(&conninfo).await?;
        // Source-side operations (snapshot export, slot bookkeeping) need
        // the namespace there too.
        meta::ensure_schema(engine.inner()).await?;
        Ok((engine.inner().clone(), conninfo))
    }
}

impl Inner {
    fn register(&self, node: &NodeId, kind: OperationKind) -> Result<Operation> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.contains_key(node) {
            return Err(InitError::AlreadyActive(node.clone()));
        }
        let op = Operation::new(kind);
        active.insert(node.clone(), op.clone());
        Ok(op)
    }

    fn unregister(&self, node: &NodeId) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(node);
    }

    /// Terminal bookkeeping for a dispatched operation.
    async fn finish(&self, node: &NodeId, elapsed: std::time::Duration, result: Result<()>) {
        match result {
            Ok(()) => {
                let throughput = meta::get_node(&self.pool, node)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|n| n.last_sync_throughput_bps);
                self.sink.emit(&Event::InitCompleted {
                    node: node.clone(),
                    elapsed_secs: elapsed.as_secs(),
                    throughput_bps: throughput,
                });
                tracing::info!(node = %node, elapsed_secs = elapsed.as_secs(), "operation complete");
            }
            Err(e) if e.is_cancelled() => {
                // init.cancelled was emitted when the operator signalled;
                // here we only record the outcome.
                self.state.try_fail(node).await;
                if let Err(pe) = self.progress.fail(node, "operation cancelled").await {
                    tracing::warn!(node = %node, error = %pe, "progress update failed");
                }
                tracing::info!(node = %node, "operation cancelled");
            }
            Err(e) => {
                self.state.try_fail(node).await;
                if let Err(pe) = self.progress.fail(node, &e.to_string()).await {
                    tracing::warn!(node = %node, error = %pe, "progress update failed");
                }
                self.sink.emit(&Event::InitFailed {
                    node: node.clone(),
                    error: e.to_string(),
                });
                tracing::error!(node = %node, error = %e, "operation failed");
            }
        }
        self.progress.release(node);
        self.unregister(node);
    }
}
