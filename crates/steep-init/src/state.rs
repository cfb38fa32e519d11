//! Validated init-state writes.
//!
//! The Init Manager exclusively owns `init_state`; every write funnels
//! through this store, which checks the transition table and emits the
//! `state_change` event. Other components only read.

use std::sync::Arc;

use sqlx::PgPool;
use steep_engine::meta;
use steep_types::{Event, EventSink, InitState, NodeId};

use crate::error::{InitError, Result};

/// Writer of node init states.
#[derive(Clone)]
pub struct StateStore {
    pool: PgPool,
    sink: Arc<dyn EventSink>,
}

impl StateStore {
    /// Creates a store over the local metadata pool.
    pub fn new(pool: PgPool, sink: Arc<dyn EventSink>) -> Self {
        Self { pool, sink }
    }

    /// Current state of a registered node.
    pub async fn current(&self, node: &NodeId) -> Result<InitState> {
        Ok(meta::require_node(&self.pool, node).await?.init_state)
    }

    /// Applies a validated transition, persisting and emitting the change.
    pub async fn transition(&self, node: &NodeId, to: InitState) -> Result<()> {
        let from = self.current(node).await?;
        if !from.can_transition_to(to) {
            return Err(InitError::InvalidTransition {
                node: node.clone(),
                from,
                to,
            });
        }
        meta::set_node_state(&self.pool, node, to).await?;
        tracing::info!(node = %node, %from, %to, "init state changed");
        self.sink.emit(&Event::StateChange {
            node: node.clone(),
            from,
            to,
        });
        Ok(())
    }

    /// Moves a node to `failed` when the transition table allows it.
    ///
    /// Failure handling must not mask the original error, so an
    /// impossible transition (the node never left a terminal state) only
    /// logs.
    pub async fn try_fail(&self, node: &NodeId) {
        match self.current(node).await {
            Ok(from) if from.can_transition_to(InitState::Failed) => {
                if let Err(e) = self.transition(node, InitState::Failed).await {
                    tracing::warn!(node = %node, error = %e, "failed-state transition rejected");
                }
            }
            Ok(from) => {
                tracing::debug!(node = %node, %from, "state left unchanged on failure");
            }
            Err(e) => {
                tracing::warn!(node = %node, error = %e, "could not read state on failure");
            }
        }
    }

    /// Hard-resets a node's state outside the transition table.
    ///
    /// Only the full reinitializer uses this: wiping a node back to
    /// `uninitialized` is a reset, not a lifecycle transition.
    pub async fn reset(&self, node: &NodeId, to: InitState) -> Result<()> {
        let from = self.current(node).await?;
        meta::set_node_state(&self.pool, node, to).await?;
        tracing::info!(node = %node, %from, %to, "init state reset");
        self.sink.emit(&Event::StateChange {
            node: node.clone(),
            from,
            to,
        });
        Ok(())
    }
}
