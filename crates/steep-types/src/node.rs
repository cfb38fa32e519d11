//! Node identity.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Opaque identifier for a node participating in the topology.
///
/// Node ids are operator-assigned strings ("pgha-east-1", "b"). They are
/// compared case-sensitively and never interpreted; identifier-safe forms
/// for subscription and slot names are derived by the engine layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display_roundtrip() {
        let id = NodeId::new("pgha-east-1");
        assert_eq!(id.to_string(), "pgha-east-1");
        assert_eq!(id.as_str(), "pgha-east-1");
    }

    #[test]
    fn node_id_ordering_is_lexicographic() {
        assert!(NodeId::new("a") < NodeId::new("b"));
    }
}
