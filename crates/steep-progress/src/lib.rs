//! Progress tracking for long-running Steep operations.
//!
//! One [`ProgressTracker`] serves the whole daemon: initializers mutate
//! their node's record through it, observers subscribe to a lossy broadcast
//! channel, and every update is upserted into the metadata store for point
//! reads that survive restarts.
//!
//! Throughput estimation lives in [`throughput`]: a rolling window for
//! live bytes/rows rates and an EWMA for stable ETAs.

pub mod throughput;
mod tracker;

pub use throughput::{Ewma, RollingWindow, eta_seconds};
pub use tracker::ProgressTracker;

use thiserror::Error;

/// Progress tracking errors.
#[derive(Error, Debug)]
pub enum ProgressError {
    /// Persisting or reading the progress record failed.
    #[error(transparent)]
    Engine(#[from] steep_engine::EngineError),
}

/// Result type for progress operations.
pub type Result<T> = std::result::Result<T, ProgressError>;
