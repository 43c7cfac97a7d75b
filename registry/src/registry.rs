//! The resource registry: allocation arbiter and federation ledger

use crate::error::RegistryError;
use crate::node::{NodeResources, NodeStatus, NodeType};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use workmesh_shared::{NodeId, ResourceVector, Timestamp};

/// Heartbeat multiple after which a silent remote is marked stale
const STALE_AFTER_HEARTBEATS: u32 = 3;

/// Heartbeat multiple after which a silent remote is marked inactive
const INACTIVE_AFTER_HEARTBEATS: u32 = 6;

/// Proof of a successful allocation; releasing it returns the vector to
/// the ledger. Deliberately not `Clone` so a grant is released once.
#[derive(Debug)]
pub struct AllocationHandle {
    id: u64,
    vector: ResourceVector,
}

impl AllocationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn vector(&self) -> ResourceVector {
        self.vector
    }
}

/// Node lifecycle events published by the registry
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Registered {
        node_id: NodeId,
        node_type: NodeType,
    },
    MarkedStale {
        node_id: NodeId,
    },
    MarkedInactive {
        node_id: NodeId,
    },
    Removed {
        node_id: NodeId,
    },
}

/// Consistent copy of the ledger for the scheduler
#[derive(Debug, Clone)]
pub struct Ledger {
    pub own: NodeResources,
    pub remotes: Vec<NodeResources>,
}

impl Ledger {
    pub fn parent(&self) -> Option<&NodeResources> {
        self.remotes
            .iter()
            .find(|n| n.node_type == NodeType::Parent)
    }

    pub fn children(&self) -> impl Iterator<Item = &NodeResources> {
        self.remotes
            .iter()
            .filter(|n| n.node_type == NodeType::Child)
    }

    pub fn peers(&self) -> impl Iterator<Item = &NodeResources> {
        self.remotes.iter().filter(|n| n.node_type == NodeType::Peer)
    }
}

type ChangeCallback = Arc<dyn Fn(ResourceVector) + Send + Sync>;

struct LedgerState {
    own: NodeResources,
    remotes: HashMap<NodeId, NodeResources>,
}

/// Single source of truth for the local resource ledger and observed
/// remote-node ledgers
///
/// All mutations serialize on one writer-exclusive lock; reads share it.
/// The resource-change callback is always invoked after the lock is
/// released, with a copy of the post-mutation `used` vector, so the
/// parent connector can re-enter the registry without deadlocking.
pub struct ResourceRegistry {
    state: RwLock<LedgerState>,
    callback: RwLock<Option<ChangeCallback>>,
    next_allocation: AtomicU64,
    events: broadcast::Sender<NodeEvent>,
}

impl ResourceRegistry {
    pub fn new(own: NodeResources) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            state: RwLock::new(LedgerState {
                own,
                remotes: HashMap::new(),
            }),
            callback: RwLock::new(None),
            next_allocation: AtomicU64::new(1),
            events,
        }
    }

    /// Install the trigger-push handler invoked after every mutation of
    /// the local ledger
    pub fn set_callback(&self, f: impl Fn(ResourceVector) + Send + Sync + 'static) {
        *self.callback.write() = Some(Arc::new(f));
    }

    /// Atomically verify and reserve `req` out of the local ledger
    pub fn allocate(&self, req: ResourceVector) -> Result<AllocationHandle, RegistryError> {
        let used_after = {
            let mut state = self.state.write();
            let available = state.own.total.saturating_sub(&state.own.used);
            if !req.fits(&available) {
                return Err(RegistryError::InsufficientResources {
                    required: req,
                    available,
                });
            }
            state.own.used = state.own.used.add(&req);
            state.own.recompute_available();
            state.own.used
        };

        debug!("allocated {}, used now {}", req, used_after);
        self.notify_change(used_after);

        Ok(AllocationHandle {
            id: self.next_allocation.fetch_add(1, Ordering::Relaxed),
            vector: req,
        })
    }

    /// Return an allocation to the ledger, saturating at zero
    pub fn release(&self, handle: AllocationHandle) {
        let used_after = {
            let mut state = self.state.write();
            state.own.used = state.own.used.saturating_sub(&handle.vector);
            state.own.recompute_available();
            state.own.used
        };

        debug!(
            "released allocation {} ({}), used now {}",
            handle.id, handle.vector, used_after
        );
        self.notify_change(used_after);
    }

    fn notify_change(&self, used: ResourceVector) {
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(used);
        }
    }

    /// Upsert an observed remote node; absent nodes are inserted with
    /// the node type the call site intends (child for registrations,
    /// peer for discovery, parent for the connector)
    pub fn update_remote(&self, intent: NodeType, mut observed: NodeResources) {
        let node_id = observed.node_id.clone();
        let inserted = {
            let mut state = self.state.write();
            observed.recompute_available();
            observed.last_seen = Timestamp::now();
            observed.status = NodeStatus::Active;

            match state.remotes.entry(node_id.clone()) {
                Entry::Occupied(mut entry) => {
                    // a later observation never flips the relationship
                    observed.node_type = entry.get().node_type;
                    entry.insert(observed);
                    false
                }
                Entry::Vacant(entry) => {
                    observed.node_type = intent;
                    entry.insert(observed);
                    true
                }
            }
        };

        if inserted {
            info!("node registered: {} ({:?})", node_id, intent);
            let _ = self.events.send(NodeEvent::Registered {
                node_id,
                node_type: intent,
            });
        }
    }

    /// Remove a remote entry on explicit deregistration
    pub fn remove_remote(&self, node_id: &NodeId) -> bool {
        let removed = self.state.write().remotes.remove(node_id).is_some();
        if removed {
            info!("node removed from registry: {}", node_id);
            let _ = self.events.send(NodeEvent::Removed {
                node_id: node_id.clone(),
            });
        }
        removed
    }

    /// Consistent copy of self plus all known remote nodes, remotes
    /// sorted by node id for reproducible scheduling decisions
    pub fn snapshot(&self) -> Ledger {
        let state = self.state.read();
        let mut remotes: Vec<NodeResources> = state.remotes.values().cloned().collect();
        remotes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ledger {
            own: state.own.clone(),
            remotes,
        }
    }

    /// Copy of this node's own ledger entry
    pub fn own_resources(&self) -> NodeResources {
        self.state.read().own.clone()
    }

    /// Subscribe to node lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Run one stale-detection pass against the given clock
    fn sweep_at(&self, now: Timestamp, heartbeat_interval: Duration) {
        let stale_after = heartbeat_interval * STALE_AFTER_HEARTBEATS;
        let inactive_after = heartbeat_interval * INACTIVE_AFTER_HEARTBEATS;

        let mut marked_stale = Vec::new();
        let mut marked_inactive = Vec::new();

        {
            let mut state = self.state.write();
            for node in state.remotes.values_mut() {
                if node.node_type == NodeType::Parent {
                    continue;
                }
                let silent = Duration::from_nanos(
                    now.as_nanos().saturating_sub(node.last_seen.as_nanos()),
                );
                if silent > inactive_after {
                    if node.status != NodeStatus::Inactive {
                        node.status = NodeStatus::Inactive;
                        marked_inactive.push(node.node_id.clone());
                    }
                } else if silent > stale_after {
                    if node.status == NodeStatus::Active {
                        node.status = NodeStatus::Stale;
                        marked_stale.push(node.node_id.clone());
                    }
                }
            }
        }

        for node_id in marked_stale {
            info!("node went stale: {}", node_id);
            let _ = self.events.send(NodeEvent::MarkedStale { node_id });
        }
        for node_id in marked_inactive {
            info!("node went inactive: {}", node_id);
            let _ = self.events.send(NodeEvent::MarkedInactive { node_id });
        }
    }

    /// Run one stale-detection pass now
    pub fn sweep_once(&self, heartbeat_interval: Duration) {
        self.sweep_at(Timestamp::now(), heartbeat_interval);
    }

    /// Spawn the background sweep loop, one pass per heartbeat interval
    pub fn start_sweep(
        self: &Arc<Self>,
        heartbeat_interval: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("registry sweep loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        registry.sweep_once(heartbeat_interval);
                    }
                }
            }
        })
    }
}
