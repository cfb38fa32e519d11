//! Error types for the snapshot engine.

use thiserror::Error;

/// Snapshot engine errors.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Engine access failure.
    #[error(transparent)]
    Engine(#[from] steep_engine::EngineError),

    /// File I/O failure.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest could not be parsed.
    #[error("corrupt manifest: {0}")]
    ManifestCorrupt(#[from] serde_json::Error),

    /// Verification found mismatching or missing files.
    #[error("snapshot verification failed: {}", .0.join("; "))]
    VerificationFailed(Vec<String>),

    /// An export worker failed.
    #[error("export of {table} failed: {reason}")]
    ExportFailed { table: String, reason: String },

    /// Apply refused to load into populated tables.
    #[error("target table(s) not empty: {}; truncate them and retry", .0.join(", "))]
    TargetNotEmpty(Vec<String>),

    /// The operation was cancelled.
    #[error("snapshot operation cancelled")]
    Cancelled,

    /// Core type parse failure in a stored record.
    #[error("corrupt snapshot record: {0}")]
    CorruptValue(#[from] steep_types::Error),
}

impl From<sqlx::Error> for SnapshotError {
    fn from(e: sqlx::Error) -> Self {
        SnapshotError::Engine(e.into())
    }
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;
