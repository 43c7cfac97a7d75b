//! Workmesh Federation - discovery fabric between related nodes
//!
//! The parent connector makes this node discoverable upstream and keeps
//! the parent's view of local resources near-real-time through periodic
//! and trigger-driven heartbeats. Peer discovery exchanges resource
//! views with a configured set of peer addresses on a coarser,
//! polling-only cadence.

pub mod parent;
pub mod peers;
pub mod wire;

pub use parent::ParentConnector;
pub use peers::PeerDiscovery;
pub use wire::{HeartbeatRequest, RegistrationRequest, RegistrationResponse, UnregisterRequest};
