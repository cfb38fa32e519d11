//! Error types for the initialization subsystem.

use steep_types::{InitMethod, InitState, NodeId};
use thiserror::Error;

/// Initialization errors.
#[derive(Error, Debug)]
pub enum InitError {
    /// An operation is already running for this node.
    #[error("an initialization operation is already active for node {0}")]
    AlreadyActive(NodeId),

    /// No operation is running for this node.
    #[error("no active initialization operation for node {0}")]
    NoActiveOp(NodeId),

    /// The requested state transition is not in the state machine.
    #[error("invalid state transition for node {node}: {from} -> {to}")]
    InvalidTransition {
        node: NodeId,
        from: InitState,
        to: InitState,
    },

    /// The method is declared but not supported.
    #[error("init method {0} is not supported")]
    UnsupportedMethod(InitMethod),

    /// `schema_sync = auto` is recognized but not implemented.
    #[error("schema_sync mode 'auto' is not implemented; use 'strict' or 'manual'")]
    SchemaSyncAuto,

    /// Local and source schemas differ under strict checking.
    #[error("schema mismatch with source on {} table(s): {}", .0.len(), .0.join(", "))]
    SchemaMismatch(Vec<String>),

    /// A table exceeded the large-table threshold under fail-fast handling.
    #[error("table {table} is {size_bytes} bytes, above the large-table threshold {threshold}")]
    LargeTable {
        table: String,
        size_bytes: u64,
        threshold: u64,
    },

    /// Request validation failure.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A catch-up or readiness monitor hit its ceiling.
    #[error("{what} did not complete within {secs} s")]
    Timeout { what: &'static str, secs: u64 },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Engine access failure.
    #[error(transparent)]
    Engine(#[from] steep_engine::EngineError),

    /// Schema comparison failure.
    #[error(transparent)]
    Schema(#[from] steep_schema::SchemaError),

    /// Progress tracking failure.
    #[error(transparent)]
    Progress(#[from] steep_progress::ProgressError),

    /// Snapshot engine failure.
    #[error(transparent)]
    Snapshot(#[from] steep_snapshot::SnapshotError),

    /// Merge engine failure.
    #[error(transparent)]
    Merge(#[from] steep_merge::MergeError),

    /// Option parse failure.
    #[error("invalid option: {0}")]
    Options(#[from] steep_types::Error),
}

impl From<sqlx::Error> for InitError {
    fn from(e: sqlx::Error) -> Self {
        InitError::Engine(e.into())
    }
}

impl InitError {
    /// True when the error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            InitError::Cancelled
                | InitError::Snapshot(steep_snapshot::SnapshotError::Cancelled)
                | InitError::Merge(steep_merge::MergeError::Cancelled)
        )
    }
}

/// Result type for initialization operations.
pub type Result<T> = std::result::Result<T, InitError>;
