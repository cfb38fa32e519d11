//! Merge summaries and conflict reports.

use serde::Serialize;
use uuid::Uuid;

use crate::strategy::ConflictStrategy;

/// Per-table merge outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableMergeReport {
    /// Qualified table name.
    pub table: String,
    /// Rows identical on both sides.
    pub matches: u64,
    /// Rows with the same PK but different content.
    pub conflicts: u64,
    /// Rows present only on node A.
    pub local_only: u64,
    /// Rows present only on node B.
    pub remote_only: u64,
    /// Conflicts applied (kept_a / kept_b).
    pub resolved: u64,
    /// Conflicts left for the operator.
    pub skipped: u64,
    /// Rows copied A→B.
    pub transferred_a_to_b: u64,
    /// Rows copied B→A.
    pub transferred_b_to_a: u64,
}

/// One unresolved conflict surfaced under the manual strategy.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    /// Qualified table name.
    pub table: String,
    /// Primary key value.
    pub pk: String,
    /// Node A's content hash.
    pub node_a_hash: String,
    /// Node B's content hash.
    pub node_b_hash: String,
}

/// Result of one merge run.
#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
    /// Merge operation id.
    pub merge_id: Uuid,
    /// Strategy used.
    pub strategy: ConflictStrategy,
    /// Whether data was modified.
    pub dry_run: bool,
    /// Tables in merge order.
    pub tables: Vec<TableMergeReport>,
    /// Conflicts not applied (manual strategy only).
    pub conflict_reports: Vec<ConflictReport>,
}

impl MergeSummary {
    /// Total conflicts across all tables.
    pub fn total_conflicts(&self) -> u64 {
        self.tables.iter().map(|t| t.conflicts).sum()
    }

    /// Total rows moved in either direction.
    pub fn total_transferred(&self) -> u64 {
        self.tables
            .iter()
            .map(|t| t.transferred_a_to_b + t.transferred_b_to_a)
            .sum()
    }

    /// True when both sides held identical data already.
    pub fn already_converged(&self) -> bool {
        self.tables
            .iter()
            .all(|t| t.conflicts == 0 && t.local_only == 0 && t.remote_only == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_totals() {
        let summary = MergeSummary {
            merge_id: Uuid::nil(),
            strategy: ConflictStrategy::PreferNodeA,
            dry_run: false,
            tables: vec![
                TableMergeReport {
                    table: "public.orders".to_string(),
                    conflicts: 1,
                    transferred_a_to_b: 1,
                    transferred_b_to_a: 1,
                    ..Default::default()
                },
                TableMergeReport {
                    table: "public.users".to_string(),
                    matches: 5,
                    ..Default::default()
                },
            ],
            conflict_reports: Vec::new(),
        };
        assert_eq!(summary.total_conflicts(), 1);
        assert_eq!(summary.total_transferred(), 2);
        assert!(!summary.already_converged());
    }
}
