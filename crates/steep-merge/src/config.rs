//! Merge configuration.

use std::time::Duration;

use steep_engine::TableRef;
use steep_types::NodeId;
use uuid::Uuid;

use crate::strategy::ConflictStrategy;

/// Inputs for one merge operation.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Operation id, stamped on every audit entry.
    pub merge_id: Uuid,
    /// The local node ("A" in reports and resolutions).
    pub node_a: NodeId,
    /// The remote node ("B").
    pub node_b: NodeId,
    /// Tables to merge, schema-qualified.
    pub tables: Vec<TableRef>,
    /// How conflicting rows are decided.
    pub strategy: ConflictStrategy,
    /// Per-table quiesce acquisition timeout.
    pub quiesce_timeout: Duration,
    /// Analyze only; make no data changes.
    pub dry_run: bool,
}

impl MergeConfig {
    /// Creates a config with a fresh merge id.
    pub fn new(
        node_a: NodeId,
        node_b: NodeId,
        tables: Vec<TableRef>,
        strategy: ConflictStrategy,
    ) -> Self {
        Self {
            merge_id: Uuid::new_v4(),
            node_a,
            node_b,
            tables,
            strategy,
            quiesce_timeout: Duration::from_secs(30),
            dry_run: false,
        }
    }
}
