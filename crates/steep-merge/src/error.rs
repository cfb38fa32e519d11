//! Error types for the merge engine.

use thiserror::Error;

/// Merge engine errors.
#[derive(Error, Debug)]
pub enum MergeError {
    /// Engine access failure.
    #[error(transparent)]
    Engine(#[from] steep_engine::EngineError),

    /// A table in the merge set has no primary key.
    #[error("table {0} has no primary key; merge requires one")]
    MissingPrimaryKey(String),

    /// FK dependencies between the merge tables form a cycle.
    #[error("foreign key cycle among tables: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// A quiesce lock could not be acquired within the timeout.
    #[error("quiesce timeout after {timeout_ms} ms on {table} ({side})")]
    QuiesceTimeout {
        table: String,
        side: &'static str,
        timeout_ms: u64,
    },

    /// The `last-modified` strategy requires commit timestamp tracking.
    #[error("track_commit_timestamp is off on {0}; required for last-modified strategy")]
    CommitTimestampsDisabled(String),

    /// The operation was cancelled.
    #[error("merge cancelled")]
    Cancelled,
}

impl From<sqlx::Error> for MergeError {
    fn from(e: sqlx::Error) -> Self {
        MergeError::Engine(e.into())
    }
}

/// Result type for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;
