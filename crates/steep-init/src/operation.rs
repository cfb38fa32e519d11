//! Live operation bookkeeping.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use steep_types::InitMethod;
use tokio_util::sync::CancellationToken;

/// What kind of work an operation is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// An initialization with the given method.
    Init(InitMethod),
    /// A reinitialization.
    Reinit,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Init(method) => write!(f, "init({method})"),
            OperationKind::Reinit => f.write_str("reinit"),
        }
    }
}

/// One live operation.
///
/// The manager holds the cancellation token; the spawned task holds a
/// child of it. Cancelling here reaches the task at its next suspension
/// point regardless of what happened to the caller that started it.
#[derive(Debug, Clone)]
pub struct Operation {
    /// What the operation is doing.
    pub kind: OperationKind,
    /// Cancellation handle owned by the manager.
    pub cancel: CancellationToken,
    /// When the operation was registered.
    pub started_at: DateTime<Utc>,
}

impl Operation {
    /// Creates a fresh operation record.
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }
}
