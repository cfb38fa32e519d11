//! Initialization progress records.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, NodeId};

/// Coarse phase of an initialization operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    /// Validation, slot creation, schema checks.
    Preparing,
    /// Bulk data movement.
    Copying,
    /// Streaming replication catching up.
    CatchingUp,
    /// Operation finished successfully.
    Complete,
    /// Operation failed; see [`InitProgress::error`].
    Error,
}

impl ProgressPhase {
    /// Stable string form used in the catalog.
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressPhase::Preparing => "preparing",
            ProgressPhase::Copying => "copying",
            ProgressPhase::CatchingUp => "catching_up",
            ProgressPhase::Complete => "complete",
            ProgressPhase::Error => "error",
        }
    }
}

impl Display for ProgressPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressPhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparing" => Ok(ProgressPhase::Preparing),
            "copying" => Ok(ProgressPhase::Copying),
            "catching_up" => Ok(ProgressPhase::CatchingUp),
            "complete" => Ok(ProgressPhase::Complete),
            "error" => Ok(ProgressPhase::Error),
            other => Err(Error::UnknownPhase(other.to_string())),
        }
    }
}

/// Point-in-time progress of one node's initialization.
///
/// Upserted throughout an operation, keyed by node; streamed to observers
/// over the progress channel and persisted for point reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitProgress {
    /// Node being initialized.
    pub node: NodeId,
    /// Current phase.
    pub phase: ProgressPhase,
    /// Weighted overall completion, 0.0..=100.0.
    pub overall_percent: f64,
    /// Total tables in scope for this operation.
    pub tables_total: u32,
    /// Tables finished so far.
    pub tables_completed: u32,
    /// Qualified name of the table in flight, if any.
    pub current_table: Option<String>,
    /// Rows moved so far.
    pub rows_copied: u64,
    /// Bytes moved so far.
    pub bytes_copied: u64,
    /// Smoothed throughput in bytes per second.
    pub throughput_bps: Option<u64>,
    /// Estimated seconds remaining.
    pub eta_seconds: Option<u64>,
    /// When the operation started.
    pub started_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
    /// Terminal error message when `phase == Error`.
    pub error: Option<String>,
}

impl InitProgress {
    /// Creates a fresh record in the `Preparing` phase.
    pub fn begin(node: NodeId) -> Self {
        let now = Utc::now();
        Self {
            node,
            phase: ProgressPhase::Preparing,
            overall_percent: 0.0,
            tables_total: 0,
            tables_completed: 0,
            current_table: None,
            rows_copied: 0,
            bytes_copied: 0,
            throughput_bps: None,
            eta_seconds: None,
            started_at: now,
            updated_at: now,
            error: None,
        }
    }

    /// True once the operation reached a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, ProgressPhase::Complete | ProgressPhase::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_starts_preparing() {
        let p = InitProgress::begin(NodeId::new("b"));
        assert_eq!(p.phase, ProgressPhase::Preparing);
        assert_eq!(p.overall_percent, 0.0);
        assert!(!p.is_terminal());
    }

    #[test]
    fn terminal_phases() {
        let mut p = InitProgress::begin(NodeId::new("b"));
        p.phase = ProgressPhase::Complete;
        assert!(p.is_terminal());
        p.phase = ProgressPhase::Error;
        assert!(p.is_terminal());
    }

    #[test]
    fn phase_string_roundtrip() {
        for phase in [
            ProgressPhase::Preparing,
            ProgressPhase::Copying,
            ProgressPhase::CatchingUp,
            ProgressPhase::Complete,
            ProgressPhase::Error,
        ] {
            assert_eq!(phase.as_str().parse::<ProgressPhase>().unwrap(), phase);
        }
    }
}
