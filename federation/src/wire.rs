//! Wire payloads exchanged between federated nodes

use serde::{Deserialize, Serialize};
use workmesh_registry::NodeResources;
use workmesh_shared::NodeId;

/// Body of `POST /api/register` and `POST /api/peer/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub node_id: NodeId,
    pub resources: NodeResources,
}

/// Response of `POST /api/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub parent_node: NodeResources,
}

/// Body of `POST /api/heartbeat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub node_id: NodeId,
    pub resources: NodeResources,
}

/// Body of `POST /api/unregister` and `POST /api/peer/unregister`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterRequest {
    pub node_id: NodeId,
}
