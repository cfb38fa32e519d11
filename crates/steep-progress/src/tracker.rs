//! The per-node progress tracker.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use sqlx::PgPool;
use steep_engine::meta;
use steep_types::{InitProgress, NodeId, ProgressPhase};
use tokio::sync::broadcast;

use crate::Result;

/// Default broadcast buffer size.
const DEFAULT_BUFFER: usize = 256;

/// Tracks initialization progress for every node.
///
/// Single producer per operation, one tracker per daemon. Updates go three
/// ways: into the in-memory map for cheap point reads, onto the broadcast
/// channel for streaming observers, and into the metadata store for reads
/// that survive restarts. The channel is lossy: a lagging subscriber loses
/// the oldest events, producers never block.
pub struct ProgressTracker {
    pool: PgPool,
    state: Mutex<HashMap<NodeId, InitProgress>>,
    tx: broadcast::Sender<InitProgress>,
}

impl ProgressTracker {
    /// Creates a tracker with the default broadcast buffer.
    pub fn new(pool: PgPool) -> Self {
        Self::with_buffer(pool, DEFAULT_BUFFER)
    }

    /// Creates a tracker with an explicit broadcast buffer size.
    pub fn with_buffer(pool: PgPool, buffer: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer.max(1));
        Self {
            pool,
            state: Mutex::new(HashMap::new()),
            tx,
        }
    }

    /// Subscribes to the progress stream.
    pub fn subscribe(&self) -> broadcast::Receiver<InitProgress> {
        self.tx.subscribe()
    }

    /// Starts tracking a fresh operation for `node`.
    pub async fn begin(&self, node: &NodeId) -> Result<()> {
        let record = InitProgress::begin(node.clone());
        self.store(record).await
    }

    /// Applies `mutate` to the node's record, stamps it, then persists and
    /// broadcasts the result.
    pub async fn update<F>(&self, node: &NodeId, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut InitProgress),
    {
        let record = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let record = state
                .entry(node.clone())
                .or_insert_with(|| InitProgress::begin(node.clone()));
            mutate(record);
            record.updated_at = Utc::now();
            record.clone()
        };
        meta::upsert_progress(&self.pool, &record).await?;
        let _ = self.tx.send(record);
        Ok(())
    }

    /// Marks the operation complete at 100%.
    pub async fn complete(&self, node: &NodeId) -> Result<()> {
        self.update(node, |p| {
            p.phase = ProgressPhase::Complete;
            p.overall_percent = 100.0;
            p.current_table = None;
            p.eta_seconds = Some(0);
            p.error = None;
        })
        .await
    }

    /// Marks the operation failed with diagnostic detail for the operator.
    pub async fn fail(&self, node: &NodeId, error: &str) -> Result<()> {
        self.update(node, |p| {
            p.phase = ProgressPhase::Error;
            p.error = Some(error.to_string());
        })
        .await
    }

    /// Point-reads a node's progress: the live record when an operation is
    /// in flight, else whatever the store holds.
    pub async fn get(&self, node: &NodeId) -> Result<Option<InitProgress>> {
        let live = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.get(node).cloned()
        };
        if live.is_some() {
            return Ok(live);
        }
        Ok(meta::get_progress(&self.pool, node).await?)
    }

    /// Clears a node's progress, live and stored.
    pub async fn clear(&self, node: &NodeId) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.remove(node);
        }
        meta::clear_progress(&self.pool, node).await?;
        Ok(())
    }

    /// Drops the live record once an operation ends, keeping the stored
    /// terminal record for later point reads.
    pub fn release(&self, node: &NodeId) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.remove(node);
    }

    async fn store(&self, record: InitProgress) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.insert(record.node.clone(), record.clone());
        }
        meta::upsert_progress(&self.pool, &record).await?;
        let _ = self.tx.send(record);
        Ok(())
    }
}
