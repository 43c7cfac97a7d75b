//! Peer discovery: register with peers and poll their resource views

use crate::wire::{RegistrationRequest, UnregisterRequest};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use workmesh_registry::{NodeResources, NodeType, ResourceRegistry};

/// Exchanges resource views with a configured set of peer addresses
///
/// Peer freshness is polling-based; the coarser cadence is deliberate
/// because peer delegation is the fallback path.
pub struct PeerDiscovery {
    registry: Arc<ResourceRegistry>,
    client: reqwest::Client,
    poll_interval: Duration,
    request_timeout: Duration,
    peers: RwLock<Vec<String>>,
}

impl PeerDiscovery {
    pub fn new(
        addresses: Vec<String>,
        registry: Arc<ResourceRegistry>,
        poll_interval: Duration,
        request_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            client: reqwest::Client::new(),
            poll_interval,
            request_timeout,
            peers: RwLock::new(addresses),
        })
    }

    /// Extend the peer set; the next poll cycle picks the address up
    pub fn add_peer(&self, address: impl Into<String>) {
        let address = address.into();
        let mut peers = self.peers.write();
        if !peers.contains(&address) {
            info!("peer added: {}", address);
            peers.push(address);
        }
    }

    pub fn peer_addresses(&self) -> Vec<String> {
        self.peers.read().clone()
    }

    /// Announce this node to every configured peer, best-effort
    pub async fn register_all(&self) {
        let own = self.registry.own_resources();
        for address in self.peer_addresses() {
            let request = RegistrationRequest {
                node_id: own.node_id.clone(),
                resources: own.clone(),
            };
            let url = format!("http://{}/api/peer/register", address);
            match self
                .client
                .post(&url)
                .timeout(self.request_timeout)
                .json(&request)
                .send()
                .await
            {
                Ok(_) => debug!("registered with peer {}", address),
                Err(e) => debug!("peer registration with {} failed: {}", address, e),
            }
        }
    }

    /// Withdraw from every configured peer, best-effort
    pub async fn unregister_all(&self) {
        let own = self.registry.own_resources();
        for address in self.peer_addresses() {
            let url = format!("http://{}/api/peer/unregister", address);
            let request = UnregisterRequest {
                node_id: own.node_id.clone(),
            };
            if let Err(e) = self
                .client
                .post(&url)
                .timeout(self.request_timeout)
                .json(&request)
                .send()
                .await
            {
                debug!("peer unregister with {} failed: {}", address, e);
            }
        }
    }

    /// Pull each peer's self ledger and upsert it into the registry
    pub async fn poll_once(&self) {
        for address in self.peer_addresses() {
            let url = format!("http://{}/api/resources", address);
            let response = self
                .client
                .get(&url)
                .timeout(self.request_timeout)
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    match response.json::<NodeResources>().await {
                        Ok(mut observed) => {
                            // the poll target's address is authoritative
                            observed.address = address.clone();
                            self.registry.update_remote(NodeType::Peer, observed);
                        }
                        Err(e) => debug!("peer {} returned unreadable resources: {}", address, e),
                    }
                }
                Ok(response) => debug!(
                    "peer {} rejected resource poll with status {}",
                    address,
                    response.status()
                ),
                Err(e) => debug!("peer poll of {} failed: {}", address, e),
            }
        }
    }

    /// Register with peers, then poll on the configured interval
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let discovery = Arc::clone(self);
        tokio::spawn(async move {
            discovery.register_all().await;

            let mut ticker = tokio::time::interval(discovery.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        discovery.unregister_all().await;
                        debug!("peer discovery stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        discovery.poll_once().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use workmesh_shared::{NodeId, ResourceVector};

    fn test_registry() -> Arc<ResourceRegistry> {
        Arc::new(ResourceRegistry::new(NodeResources::new(
            NodeId::from("edge-1"),
            NodeType::SelfNode,
            "127.0.0.1:8900",
            ResourceVector::new(4.0, 0, 8 << 30, 0),
        )))
    }

    fn peer_ledger(id: &str, cpu: f64) -> NodeResources {
        NodeResources::new(
            NodeId::from(id),
            NodeType::SelfNode,
            "self-reported:0",
            ResourceVector::new(cpu, 0, 16 << 30, 0),
        )
    }

    #[tokio::test]
    async fn test_poll_upserts_peer_with_stamped_address() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/resources"))
            .respond_with(ResponseTemplate::new(200).set_body_json(peer_ledger("peer-9", 12.0)))
            .mount(&server)
            .await;

        let registry = test_registry();
        let address = server.uri().trim_start_matches("http://").to_string();
        let discovery = PeerDiscovery::new(
            vec![address.clone()],
            Arc::clone(&registry),
            Duration::from_secs(30),
            Duration::from_secs(2),
        );

        discovery.poll_once().await;

        let snapshot = registry.snapshot();
        let peer = snapshot.peers().next().expect("peer upserted");
        assert_eq!(peer.node_id, NodeId::from("peer-9"));
        assert_eq!(peer.node_type, NodeType::Peer);
        assert_eq!(peer.address, address);
        assert_eq!(peer.total.cpu, 12.0);
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_skipped() {
        let registry = test_registry();
        let discovery = PeerDiscovery::new(
            vec!["127.0.0.1:9".to_string()],
            Arc::clone(&registry),
            Duration::from_secs(30),
            Duration::from_millis(200),
        );

        discovery.poll_once().await;
        assert!(registry.snapshot().remotes.is_empty());
    }

    #[tokio::test]
    async fn test_add_peer_deduplicates() {
        let discovery = PeerDiscovery::new(
            vec!["10.0.0.1:8900".to_string()],
            test_registry(),
            Duration::from_secs(30),
            Duration::from_secs(2),
        );

        discovery.add_peer("10.0.0.2:8900");
        discovery.add_peer("10.0.0.1:8900");
        assert_eq!(discovery.peer_addresses().len(), 2);
    }

    #[tokio::test]
    async fn test_register_all_announces_node_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/peer/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let registry = test_registry();
        let address = server.uri().trim_start_matches("http://").to_string();
        let discovery = PeerDiscovery::new(
            vec![address],
            registry,
            Duration::from_secs(30),
            Duration::from_secs(2),
        );

        discovery.register_all().await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: RegistrationRequest = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body.node_id, NodeId::from("edge-1"));
        assert_eq!(body.resources.total.cpu, 4.0);
    }
}
