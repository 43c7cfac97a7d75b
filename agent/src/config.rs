//! Configuration management for the workmesh agent

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use workmesh_executor::ExecutorConfig;
use workmesh_scheduler::StrategyKind;
use workmesh_shared::{AgentError, ResourceVector};

/// Global configuration for one agent process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub node: NodeConfig,
    pub resources: ResourcesConfig,
    pub parent: ParentConfig,
    pub peers: PeersConfig,
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorSection,
    pub logging: LoggingConfig,

    /// Cadence of heartbeats, peer polls and the stale sweep, seconds
    pub heartbeat_interval_secs: u64,
}

/// Node identity and listen address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identifier, unique within the federation; generated when
    /// left empty
    pub id: String,

    /// Address the HTTP API binds to
    pub listen_address: String,

    /// Port the HTTP API binds to; 0 picks an ephemeral port
    pub listen_port: u16,

    /// host:port other nodes can reach this agent on; derived from the
    /// bound listener when left empty
    pub advertise_address: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            listen_address: "0.0.0.0".to_string(),
            listen_port: 8900,
            advertise_address: String::new(),
        }
    }
}

/// Owned resources; components left at zero are detected from the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    pub cpu: f64,
    pub gpu: u64,
    pub memory: u64,
    pub storage: u64,
}

impl ResourcesConfig {
    pub fn as_vector(&self) -> ResourceVector {
        ResourceVector::new(self.cpu, self.gpu, self.memory, self.storage)
    }
}

/// Parent connector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentConfig {
    pub enabled: bool,
    /// host:port of the parent's HTTP API
    pub address: String,
}

/// Peer discovery configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    pub enabled: bool,
    /// host:port entries of peer HTTP APIs
    pub addresses: Vec<String>,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Placement strategy: "default" or "best-fit"
    pub strategy: StrategyKind,

    /// Timeout of delegation and follow-up HTTP calls, seconds
    pub request_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Default,
            request_timeout_secs: 10,
        }
    }
}

/// Executor and service-supervision tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Directory receiving one capture file per workload
    pub log_dir: String,

    /// Readiness window for service children, seconds
    pub startup_timeout_secs: u64,

    /// Readiness poll interval, milliseconds
    pub readiness_poll_ms: u64,

    /// Supervised health probe interval, seconds
    pub health_interval_secs: u64,

    /// Per-probe HTTP timeout, seconds
    pub probe_timeout_secs: u64,

    /// Consecutive probe failures treated as a crash
    pub health_failure_threshold: u32,

    /// Respawn budget before a service is abandoned
    pub restart_limit: u32,

    /// Grace period between SIGTERM and SIGKILL, seconds
    pub stop_timeout_secs: u64,

    /// Container runtime binary
    pub container_runtime: String,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        let defaults = ExecutorConfig::default();
        Self {
            log_dir: defaults.log_dir.to_string_lossy().into_owned(),
            startup_timeout_secs: defaults.startup_timeout.as_secs(),
            readiness_poll_ms: defaults.readiness_poll_interval.as_millis() as u64,
            health_interval_secs: defaults.health_interval.as_secs(),
            probe_timeout_secs: defaults.probe_timeout.as_secs(),
            health_failure_threshold: defaults.health_failure_threshold,
            restart_limit: defaults.restart_limit,
            stop_timeout_secs: defaults.stop_timeout.as_secs(),
            container_runtime: defaults.container_runtime,
        }
    }
}

impl ExecutorSection {
    pub fn as_executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            log_dir: PathBuf::from(&self.log_dir),
            startup_timeout: Duration::from_secs(self.startup_timeout_secs),
            readiness_poll_interval: Duration::from_millis(self.readiness_poll_ms),
            health_interval: Duration::from_secs(self.health_interval_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            health_failure_threshold: self.health_failure_threshold,
            restart_limit: self.restart_limit,
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            container_runtime: self.container_runtime.clone(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, AgentError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("cannot read {}: {}", path, e)))?;
        let mut config: AgentConfig = toml::from_str(&content)
            .map_err(|e| AgentError::Config(format!("cannot parse {}: {}", path, e)))?;
        config.fill_generated_fields();
        Ok(config)
    }

    /// Generate the node id when the config leaves it empty
    pub fn fill_generated_fields(&mut self) {
        if self.node.id.trim().is_empty() {
            self.node.id = format!("node-{:08x}", rand::random::<u32>());
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.request_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(AgentError::Config(
                "heartbeat_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.parent.enabled && self.parent.address.trim().is_empty() {
            return Err(AgentError::Config(
                "parent.address is required when the parent connector is enabled".to_string(),
            ));
        }
        if self.peers.enabled && self.peers.addresses.is_empty() {
            return Err(AgentError::Config(
                "peers.addresses is required when peer discovery is enabled".to_string(),
            ));
        }
        if self.scheduler.request_timeout_secs == 0 {
            return Err(AgentError::Config(
                "scheduler.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            resources: ResourcesConfig::default(),
            parent: ParentConfig::default(),
            peers: PeersConfig::default(),
            scheduler: SchedulerConfig::default(),
            executor: ExecutorSection::default(),
            logging: LoggingConfig::default(),
            heartbeat_interval_secs: 30,
        }
    }
}
