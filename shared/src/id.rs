//! Identifier types for workmesh components

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Node identifier, opaque and unique within a federation
///
/// Node ids arrive from static configuration and from registration
/// payloads; the agent never interprets their contents. Ordering is
/// lexicographic so scheduling tie-breaks are reproducible.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Workload identifier assigned at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadId(Uuid);

impl WorkloadId {
    /// Generate a fresh random identifier
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from its canonical string form
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_id_uniqueness() {
        let id1 = WorkloadId::random();
        let id2 = WorkloadId::random();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_workload_id_round_trip() {
        let id = WorkloadId::random();
        let parsed = WorkloadId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_node_id_ordering() {
        let a = NodeId::from("node-a");
        let b = NodeId::from("node-b");
        assert!(a < b);
        assert_eq!(a.as_str(), "node-a");
    }

    #[test]
    fn test_node_id_serde_transparent() {
        let id = NodeId::from("edge-7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"edge-7\"");
        let parsed: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
