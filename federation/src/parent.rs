//! Parent connector: registration, heartbeats and trigger-driven push

use crate::wire::{HeartbeatRequest, RegistrationRequest, RegistrationResponse, UnregisterRequest};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use workmesh_registry::{NodeType, ResourceRegistry};

/// Keeps the parent's view of this node near-real-time
///
/// Heartbeats are best-effort: network errors log at debug and never
/// mutate local state. The trigger path coalesces through a single-slot
/// channel so at most one out-of-band heartbeat is pending while
/// another is in flight.
pub struct ParentConnector {
    parent_address: String,
    registry: Arc<ResourceRegistry>,
    client: reqwest::Client,
    heartbeat_interval: Duration,
    request_timeout: Duration,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl ParentConnector {
    pub fn new(
        parent_address: impl Into<String>,
        registry: Arc<ResourceRegistry>,
        heartbeat_interval: Duration,
        request_timeout: Duration,
    ) -> Arc<Self> {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        Arc::new(Self {
            parent_address: parent_address.into(),
            registry,
            client: reqwest::Client::new(),
            heartbeat_interval,
            request_timeout,
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
        })
    }

    /// Request an immediate out-of-band heartbeat; coalesces while one
    /// is already pending. Safe to call from the registry callback.
    pub fn trigger_heartbeat(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Register with the parent; failure is a warning, the agent runs
    /// independently either way
    pub async fn register(&self) {
        let own = self.registry.own_resources();
        let request = RegistrationRequest {
            node_id: own.node_id.clone(),
            resources: own,
        };
        let url = format!("http://{}/api/register", self.parent_address);

        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<RegistrationResponse>().await {
                    Ok(body) => {
                        let mut parent = body.parent_node;
                        parent.address = self.parent_address.clone();
                        self.registry.update_remote(NodeType::Parent, parent);
                        info!("registered with parent {}", self.parent_address);
                    }
                    Err(e) => warn!("parent registration response unreadable: {}", e),
                }
            }
            Ok(response) => warn!(
                "parent registration rejected with status {}",
                response.status()
            ),
            Err(e) => warn!("parent registration failed: {}", e),
        }
    }

    /// Deregister from the parent, best-effort
    pub async fn unregister(&self) {
        let own = self.registry.own_resources();
        let url = format!("http://{}/api/unregister", self.parent_address);
        let request = UnregisterRequest {
            node_id: own.node_id,
        };

        if let Err(e) = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
        {
            debug!("parent unregister failed: {}", e);
        }
    }

    async fn send_heartbeat(&self) {
        let own = self.registry.own_resources();
        let request = HeartbeatRequest {
            node_id: own.node_id.clone(),
            resources: own,
        };
        let url = format!("http://{}/api/heartbeat", self.parent_address);

        match self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("heartbeat delivered to {}", self.parent_address)
            }
            Ok(response) => debug!("heartbeat rejected with status {}", response.status()),
            Err(e) => debug!("heartbeat failed: {}", e),
        }
    }

    /// Register, then run the heartbeat loop until shutdown
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let connector = Arc::clone(self);
        let mut trigger_rx = self
            .trigger_rx
            .lock()
            .take()
            .expect("parent connector started twice");

        tokio::spawn(async move {
            connector.register().await;

            let mut ticker = tokio::time::interval(connector.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick fires immediately and duplicates registration
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        connector.unregister().await;
                        debug!("parent connector stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        connector.send_heartbeat().await;
                    }
                    Some(_) = trigger_rx.recv() => {
                        debug!("triggered heartbeat");
                        connector.send_heartbeat().await;
                    }
                }
            }
        })
    }
}
