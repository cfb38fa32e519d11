//! The initialization subsystem.
//!
//! Takes a node from an empty or divergent state to a synchronized
//! participant in an active-active topology while writes continue on
//! peers:
//!
//! - [`manager`]: lifecycle, per-node singleton operations, progress
//!   multiplexing, cancellation
//! - [`snapshot`]: engine-driven initial copy (`copy_data = true`)
//! - [`manual`]: operator-driven backup/restore with prepare/complete
//! - [`two_phase`]: snapshot-engine export, file apply, catch-up
//! - [`bidirectional`]: merge two populated nodes, then stream both ways
//! - [`reinit`]: full wipe or scoped table recopy
//! - [`monitor`]: catch-up polling with ceilings
//!
//! The `direct` method is declared by the option surface but unsupported;
//! dispatching it fails with a validation error.

pub mod bidirectional;
pub mod context;
pub mod error;
pub mod initializer;
pub mod manager;
pub mod manual;
pub mod monitor;
pub mod operation;
pub mod reinit;
pub mod snapshot;
pub mod state;
pub mod two_phase;

pub use context::InitContext;
pub use error::{InitError, Result};
pub use initializer::{MethodInitializer, initializer_for};
pub use manager::{InitManager, ManagerConfig, ReinitOutcome};
pub use manual::{CompleteOptions, PrepareReceipt};
pub use operation::{Operation, OperationKind};
pub use reinit::{ReinitMode, ReinitReport};
pub use state::StateStore;
