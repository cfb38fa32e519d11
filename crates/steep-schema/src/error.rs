//! Error types for schema comparison.

use thiserror::Error;

/// Schema comparison errors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// Engine access failure.
    #[error(transparent)]
    Engine(#[from] steep_engine::EngineError),

    /// The remote fingerprint transport failed.
    #[error("fingerprint transport failed: {0}")]
    Transport(String),
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
