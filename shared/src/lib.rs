//! Workmesh Shared - Common types and utilities for agent components
//!
//! This crate provides the foundational types used across all workmesh
//! components: identifiers, the error umbrella, timestamps, resource
//! vectors and the workload model.

pub mod error;
pub mod id;
pub mod resources;
pub mod time;
pub mod workload;

pub use error::{AgentError, Result};
pub use id::{NodeId, WorkloadId};
pub use resources::ResourceVector;
pub use time::Timestamp;
pub use workload::{Placement, Workload, WorkloadKind, WorkloadSpec, WorkloadStatus};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
