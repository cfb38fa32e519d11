//! The method initializer contract.

use async_trait::async_trait;
use steep_types::InitMethod;

use crate::bidirectional::BidirectionalMergeInitializer;
use crate::context::InitContext;
use crate::error::{InitError, Result};
use crate::snapshot::SnapshotInitializer;
use crate::two_phase::TwoPhaseInitializer;

/// One initialization strategy, start to `synchronized`.
///
/// Implementations own the state transitions of their node for the
/// operation's lifetime; the manager handles registration, failure
/// bookkeeping, and events around the run.
#[async_trait]
pub trait MethodInitializer: Send + Sync + std::fmt::Debug {
    /// Runs the full workflow for one operation.
    async fn run(&self, ctx: &InitContext) -> Result<()>;
}

/// Resolves the initializer for a `StartInit` method.
///
/// `manual` is not dispatchable here (it is driven by prepare/complete);
/// `direct` is declared by the option surface but unsupported.
pub fn initializer_for(method: InitMethod) -> Result<Box<dyn MethodInitializer>> {
    match method {
        InitMethod::Snapshot => Ok(Box::new(SnapshotInitializer)),
        InitMethod::TwoPhase => Ok(Box::new(TwoPhaseInitializer)),
        InitMethod::BidirectionalMerge => Ok(Box::new(BidirectionalMergeInitializer)),
        InitMethod::Manual => Err(InitError::Validation(
            "manual method is driven by PrepareInit/CompleteInit".to_string(),
        )),
        InitMethod::Direct => Err(InitError::UnsupportedMethod(method)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatchable_methods() {
        assert!(initializer_for(InitMethod::Snapshot).is_ok());
        assert!(initializer_for(InitMethod::TwoPhase).is_ok());
        assert!(initializer_for(InitMethod::BidirectionalMerge).is_ok());
    }

    #[test]
    fn direct_is_unsupported() {
        let err = initializer_for(InitMethod::Direct).unwrap_err();
        assert!(matches!(err, InitError::UnsupportedMethod(InitMethod::Direct)));
    }

    #[test]
    fn manual_is_not_dispatchable() {
        assert!(matches!(
            initializer_for(InitMethod::Manual),
            Err(InitError::Validation(_))
        ));
    }
}
