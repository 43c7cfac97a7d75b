//! Workmesh Registry - authoritative per-node resource ledger
//!
//! The registry is the single source of truth for this node's owned
//! resources, the quotas currently allocated out of them, and the
//! observed resources of related nodes (parent, children, peers). It
//! arbitrates allocation and release, pushes resource-change
//! notifications, and sweeps silent remote nodes to stale/inactive.

pub mod error;
pub mod node;
pub mod registry;

pub use error::{RegistryError, Result};
pub use node::{NodeResources, NodeStatus, NodeType};
pub use registry::{AllocationHandle, Ledger, NodeEvent, ResourceRegistry};
