//! Agent bootstrap and lifecycle

use crate::api::{self, ApiState};
use crate::config::AgentConfig;
use crate::hardware;
use crate::manager::WorkloadManager;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use workmesh_executor::ExecutorSet;
use workmesh_federation::{ParentConnector, PeerDiscovery};
use workmesh_registry::{NodeResources, NodeType, ResourceRegistry};
use workmesh_scheduler::Scheduler;
use workmesh_shared::{AgentError, NodeId, Timestamp};

/// One running agent: the HTTP listener plus every background loop,
/// rooted in a single cancellation token
pub struct Agent {
    local_addr: SocketAddr,
    registry: Arc<ResourceRegistry>,
    manager: Arc<WorkloadManager>,
    peers: Option<Arc<PeerDiscovery>>,
    shutdown: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Agent {
    /// Bind the listener, wire the subsystems and spawn the background
    /// loops. Fatal errors here terminate startup; after this returns
    /// the agent only stops on request.
    pub async fn start(mut config: AgentConfig) -> Result<Self, AgentError> {
        config.fill_generated_fields();
        config.validate()?;

        let bind = format!("{}:{}", config.node.listen_address, config.node.listen_port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|e| AgentError::Config(format!("cannot bind {}: {}", bind, e)))?;
        let local_addr = listener.local_addr()?;

        // the advertised address is what other nodes dial; a wildcard
        // bind cannot be advertised verbatim
        let advertise = if config.node.advertise_address.trim().is_empty() {
            let host = match config.node.listen_address.as_str() {
                "" | "0.0.0.0" | "::" => "127.0.0.1".to_string(),
                other => other.to_string(),
            };
            format!("{}:{}", host, local_addr.port())
        } else {
            config.node.advertise_address.clone()
        };

        let total = hardware::detect_resources(config.resources.as_vector());
        let registry = Arc::new(ResourceRegistry::new(NodeResources::new(
            NodeId::from(config.node.id.clone()),
            NodeType::SelfNode,
            advertise,
            total,
        )));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let executors = Arc::new(ExecutorSet::new(
            config.executor.as_executor_config(),
            events_tx,
        ));
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            Arc::clone(&executors),
            config.scheduler.strategy,
            config.request_timeout(),
        );
        let manager = WorkloadManager::new(Arc::clone(&registry), scheduler, executors);

        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        tasks.push(manager.start_event_loop(events_rx, shutdown.clone()));
        tasks.push(registry.start_sweep(config.heartbeat_interval(), shutdown.clone()));

        if config.parent.enabled {
            let connector = ParentConnector::new(
                config.parent.address.clone(),
                Arc::clone(&registry),
                config.heartbeat_interval(),
                config.request_timeout(),
            );
            // every ledger mutation pushes an out-of-band heartbeat
            let trigger = Arc::clone(&connector);
            registry.set_callback(move |_used| trigger.trigger_heartbeat());
            tasks.push(connector.start(shutdown.clone()));
        }

        let peers = if config.peers.enabled {
            let discovery = PeerDiscovery::new(
                config.peers.addresses.clone(),
                Arc::clone(&registry),
                config.heartbeat_interval(),
                config.request_timeout(),
            );
            tasks.push(discovery.start(shutdown.clone()));
            Some(discovery)
        } else {
            None
        };

        let state = ApiState {
            manager: Arc::clone(&manager),
            registry: Arc::clone(&registry),
            started_at: Timestamp::now(),
        };
        let router = api::router(state);
        let server_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
            {
                warn!("http server terminated: {}", e);
            }
        }));

        info!(
            "agent {} listening on {}",
            registry.own_resources().node_id,
            local_addr
        );

        Ok(Self {
            local_addr,
            registry,
            manager,
            peers,
            shutdown,
            tasks,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<WorkloadManager> {
        &self.manager
    }

    /// Extend the peer set at runtime; the next poll picks it up
    pub fn add_peer(&self, address: impl Into<String>) {
        if let Some(peers) = &self.peers {
            peers.add_peer(address);
        } else {
            warn!("peer discovery is disabled, ignoring added peer");
        }
    }

    /// Stop local workloads, cancel the background loops and wait for
    /// them to drain
    pub async fn stop(self) {
        info!("agent shutting down");
        self.manager.stop_all().await;
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }
        info!("agent stopped");
    }
}
