//! Shared context handed to method initializers.

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::PgPool;
use steep_progress::ProgressTracker;
use steep_types::{EventSink, InitOptions, NodeId};
use tokio_util::sync::CancellationToken;

use crate::state::StateStore;

/// Everything a method initializer needs for one operation.
///
/// The cancellation token is a child of the manager-held one: it is
/// independent of whatever RPC started the operation, so initializers
/// survive caller disconnection and stop only on explicit cancel.
pub struct InitContext {
    /// Node being initialized (the local node).
    pub target: NodeId,
    /// Node data flows from.
    pub source: NodeId,
    /// Engine pool of the target node.
    pub local: PgPool,
    /// Engine pool of the source node.
    pub source_pool: PgPool,
    /// Connection string peers use to reach the source.
    pub source_conninfo: String,
    /// Connection string peers use to reach the target.
    pub local_conninfo: String,
    /// Root directory for snapshot exports.
    pub snapshot_root: PathBuf,
    /// Per-operation options.
    pub options: InitOptions,
    /// Validated state writer.
    pub state: StateStore,
    /// Progress tracker.
    pub progress: Arc<ProgressTracker>,
    /// Event sink.
    pub sink: Arc<dyn EventSink>,
    /// Cancellation signal for this operation.
    pub cancel: CancellationToken,
}

impl InitContext {
    /// Bails out with a cancellation error when the token fired.
    pub fn check_cancelled(&self) -> crate::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(crate::InitError::Cancelled);
        }
        Ok(())
    }
}
