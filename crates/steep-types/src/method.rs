//! Initialization methods.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Strategy used to bring a node into the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitMethod {
    /// Engine-driven initial copy (`copy_data = true` subscription).
    Snapshot,
    /// Operator-driven backup/restore with prepare/complete bracketing.
    Manual,
    /// Snapshot-engine export, file apply, then catch-up from the export LSN.
    TwoPhase,
    /// Declared but unsupported; rejected at validation.
    Direct,
    /// Converge two populated nodes, then start bidirectional streaming.
    BidirectionalMerge,
}

impl InitMethod {
    /// Stable string form used in the catalog and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            InitMethod::Snapshot => "snapshot",
            InitMethod::Manual => "manual",
            InitMethod::TwoPhase => "two-phase",
            InitMethod::Direct => "direct",
            InitMethod::BidirectionalMerge => "bidirectional-merge",
        }
    }
}

impl Display for InitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(InitMethod::Snapshot),
            "manual" => Ok(InitMethod::Manual),
            "two-phase" => Ok(InitMethod::TwoPhase),
            "direct" => Ok(InitMethod::Direct),
            "bidirectional-merge" => Ok(InitMethod::BidirectionalMerge),
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrip() {
        for method in [
            InitMethod::Snapshot,
            InitMethod::Manual,
            InitMethod::TwoPhase,
            InitMethod::Direct,
            InitMethod::BidirectionalMerge,
        ] {
            let parsed: InitMethod = method.as_str().parse().unwrap();
            assert_eq!(parsed, method);
        }
        assert!("rsync".parse::<InitMethod>().is_err());
    }
}
