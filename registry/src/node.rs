//! Node entries tracked by the registry

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use workmesh_shared::{NodeId, ResourceVector, Timestamp};

/// Relationship of a node entry to this agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[serde(rename = "self")]
    SelfNode,
    Parent,
    Child,
    Peer,
}

/// Liveness of a node entry
///
/// Remote nodes transition active → stale → inactive as heartbeats go
/// silent; stale and inactive nodes are not delegation candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Stale,
    Inactive,
}

/// Resource view of one node in the federation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResources {
    pub node_id: NodeId,
    pub node_type: NodeType,

    /// host:port reachable over HTTP; taken verbatim from registration
    /// payloads, never inferred from the TCP peer
    pub address: String,

    pub total: ResourceVector,
    pub used: ResourceVector,

    /// Always recomputed as `total − used`, never stored independently
    pub available: ResourceVector,

    pub status: NodeStatus,
    pub last_seen: Timestamp,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl NodeResources {
    pub fn new(
        node_id: NodeId,
        node_type: NodeType,
        address: impl Into<String>,
        total: ResourceVector,
    ) -> Self {
        Self {
            node_id,
            node_type,
            address: address.into(),
            total,
            used: ResourceVector::ZERO,
            available: total,
            status: NodeStatus::Active,
            last_seen: Timestamp::now(),
            metadata: HashMap::new(),
        }
    }

    /// Re-derive `available` from `total` and `used`
    pub fn recompute_available(&mut self) {
        self.available = self.total.saturating_sub(&self.used);
    }

    /// Eligible as a delegation target
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    /// Refresh liveness after an observation of this node
    pub fn touch(&mut self) {
        self.last_seen = Timestamp::now();
        self.status = NodeStatus::Active;
    }
}
