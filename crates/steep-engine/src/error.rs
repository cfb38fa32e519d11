//! Error types for the engine layer.

use thiserror::Error;

/// Engine access errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Underlying driver error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A replication slot with this name already exists.
    #[error("replication slot {0} already exists")]
    SlotExists(String),

    /// No replication slot with this name.
    #[error("replication slot {0} not found")]
    SlotNotFound(String),

    /// A prepared slot was already consumed by another node.
    #[error("slot {slot} already used by node {used_by}")]
    SlotAlreadyUsed { slot: String, used_by: String },

    /// Bidirectional replication is already active on the node.
    #[error("bidirectional replication already active on {node}: slot {slot} is live")]
    ReplicationActive { node: String, slot: String },

    /// No publication suitable for the requested subscription.
    #[error("no publication found on source node {0}")]
    PublicationNotFound(String),

    /// Node is not registered in the metadata store.
    #[error("node {0} is not registered")]
    NodeNotFound(String),

    /// A qualified table name did not parse.
    #[error("invalid table name {0:?}: expected schema.table")]
    InvalidTableName(String),

    /// Core type parse failure coming back from the catalog.
    #[error("corrupt catalog value: {0}")]
    CorruptValue(#[from] steep_types::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
