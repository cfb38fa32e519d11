//! The node initialization state machine.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Initialization state of a node.
///
/// The Init Manager is the only writer of this state; every transition goes
/// through [`InitState::can_transition_to`] and anything not in the table
/// is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    /// Node has never been initialized.
    Uninitialized,
    /// Validation and setup before data movement.
    Preparing,
    /// Initial table data is being copied.
    Copying,
    /// Data copied; streaming replication catching up to the source.
    CatchingUp,
    /// Fully synchronized participant.
    Synchronized,
    /// Node drifted from its peers and needs repair.
    Diverged,
    /// An operation failed; diagnostic detail lives in the progress record.
    Failed,
    /// A reinitialization is in flight.
    Reinitializing,
}

impl InitState {
    /// Returns true when the state machine permits `self → next`.
    pub fn can_transition_to(self, next: InitState) -> bool {
        use InitState::{
            CatchingUp, Copying, Diverged, Failed, Preparing, Reinitializing, Synchronized,
            Uninitialized,
        };
        matches!(
            (self, next),
            (Uninitialized, Preparing | Failed)
                | (Preparing, Copying | CatchingUp | Failed)
                | (Copying, CatchingUp | Failed)
                | (CatchingUp, Synchronized | Failed)
                | (Synchronized, Diverged)
                | (Diverged, Reinitializing | Failed)
                | (Failed, Uninitialized | Preparing | Reinitializing)
                | (Reinitializing, Copying | Synchronized | Failed)
        )
    }

    /// Stable string form used in the catalog and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            InitState::Uninitialized => "uninitialized",
            InitState::Preparing => "preparing",
            InitState::Copying => "copying",
            InitState::CatchingUp => "catching_up",
            InitState::Synchronized => "synchronized",
            InitState::Diverged => "diverged",
            InitState::Failed => "failed",
            InitState::Reinitializing => "reinitializing",
        }
    }

    /// All states, for exhaustive iteration in validation and tests.
    pub const ALL: [InitState; 8] = [
        InitState::Uninitialized,
        InitState::Preparing,
        InitState::Copying,
        InitState::CatchingUp,
        InitState::Synchronized,
        InitState::Diverged,
        InitState::Failed,
        InitState::Reinitializing,
    ];
}

impl Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uninitialized" => Ok(InitState::Uninitialized),
            "preparing" => Ok(InitState::Preparing),
            "copying" => Ok(InitState::Copying),
            "catching_up" => Ok(InitState::CatchingUp),
            "synchronized" => Ok(InitState::Synchronized),
            "diverged" => Ok(InitState::Diverged),
            "failed" => Ok(InitState::Failed),
            "reinitializing" => Ok(InitState::Reinitializing),
            other => Err(Error::UnknownState(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(InitState::Uninitialized, InitState::Preparing, true)]
    #[test_case(InitState::Uninitialized, InitState::Failed, true)]
    #[test_case(InitState::Uninitialized, InitState::Synchronized, false)]
    #[test_case(InitState::Preparing, InitState::Copying, true)]
    #[test_case(InitState::Preparing, InitState::CatchingUp, true)]
    #[test_case(InitState::Copying, InitState::CatchingUp, true)]
    #[test_case(InitState::Copying, InitState::Synchronized, false)]
    #[test_case(InitState::CatchingUp, InitState::Synchronized, true)]
    #[test_case(InitState::Synchronized, InitState::Diverged, true)]
    #[test_case(InitState::Synchronized, InitState::Failed, false)]
    #[test_case(InitState::Diverged, InitState::Reinitializing, true)]
    #[test_case(InitState::Failed, InitState::Uninitialized, true)]
    #[test_case(InitState::Failed, InitState::Preparing, true)]
    #[test_case(InitState::Failed, InitState::Reinitializing, true)]
    #[test_case(InitState::Reinitializing, InitState::Copying, true)]
    #[test_case(InitState::Reinitializing, InitState::Synchronized, true)]
    #[test_case(InitState::Reinitializing, InitState::Uninitialized, false)]
    fn transition_table(from: InitState, to: InitState, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn no_state_transitions_to_itself() {
        for state in InitState::ALL {
            assert!(!state.can_transition_to(state), "{state} must not self-loop");
        }
    }

    #[test]
    fn string_roundtrip_all_states() {
        for state in InitState::ALL {
            let parsed: InitState = state.as_str().parse().unwrap();
            assert_eq!(parsed, state);
        }
        assert!("bogus".parse::<InitState>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&InitState::CatchingUp).unwrap();
        assert_eq!(json, "\"catching_up\"");
    }
}
