//! # steep-types: Core types for Steep
//!
//! This crate contains shared types used across the Steep control plane:
//! - Node identity ([`NodeId`])
//! - Write-ahead log positions ([`Lsn`])
//! - The node initialization state machine ([`InitState`])
//! - Initialization methods ([`InitMethod`]) and per-operation options
//!   ([`InitOptions`], [`SchemaSyncMode`], [`LargeTableMethod`])
//! - Snapshot compression kinds ([`CompressionKind`])
//! - Structured control-plane events ([`Event`], [`EventSink`])
//! - Initialization progress records ([`InitProgress`], [`ProgressPhase`])

mod compression;
mod event;
mod lsn;
mod method;
mod node;
mod options;
mod progress;
mod state;

pub use compression::CompressionKind;
pub use event::{Event, EventSink, TracingSink};
pub use lsn::Lsn;
pub use method::InitMethod;
pub use node::NodeId;
pub use options::{InitOptions, LargeTableMethod, MergeOptions, SchemaSyncMode};
pub use progress::{InitProgress, ProgressPhase};
pub use state::InitState;

use thiserror::Error;

/// Errors produced while parsing or validating core types.
#[derive(Error, Debug)]
pub enum Error {
    /// Unrecognized init state name.
    #[error("unknown init state: {0}")]
    UnknownState(String),

    /// Unrecognized init method name.
    #[error("unknown init method: {0}")]
    UnknownMethod(String),

    /// Unrecognized compression kind.
    #[error("unknown compression kind: {0}")]
    UnknownCompression(String),

    /// Unrecognized schema sync mode.
    #[error("unknown schema sync mode: {0}")]
    UnknownSchemaSync(String),

    /// Unrecognized progress phase.
    #[error("unknown progress phase: {0}")]
    UnknownPhase(String),

    /// Malformed LSN string.
    #[error("invalid LSN {0:?}: expected <hex>/<hex>")]
    InvalidLsn(String),

    /// Option value outside its permitted range.
    #[error("invalid option {option}: {reason}")]
    InvalidOption { option: &'static str, reason: String },
}

/// Result type for core type operations.
pub type Result<T> = std::result::Result<T, Error>;
