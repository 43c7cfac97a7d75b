//! Workmesh Executor - polymorphic workload execution
//!
//! One executor per workload kind behind a uniform trait. Batch-style
//! kinds (process, container) spawn a child and report its exit through
//! an event channel; service kinds (mlmodel, opencv, datagateway) extend
//! process execution with a readiness barrier and a supervised health
//! loop that respawns a crashed child up to a bounded restart budget.

pub mod container;
pub mod error;
pub mod logs;
pub mod process;
pub mod service;
pub mod supervise;

pub use container::ContainerExecutor;
pub use error::{ExecutorError, Result};
pub use process::ProcessExecutor;
pub use service::{DataGatewayExecutor, MlModelExecutor, OpenCvExecutor};

use async_trait::async_trait;
use process::ProcessRunner;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use supervise::ServiceSupervisor;
use tokio::sync::mpsc;
use workmesh_shared::{Workload, WorkloadId, WorkloadKind};

/// Tuning for executors and service supervision
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Directory receiving one stdout/stderr capture file per workload
    pub log_dir: PathBuf,

    /// Window a service child has to pass its first health probe
    pub startup_timeout: Duration,

    /// Poll interval of the readiness barrier
    pub readiness_poll_interval: Duration,

    /// Interval between supervised health probes once running
    pub health_interval: Duration,

    /// Per-probe HTTP timeout
    pub probe_timeout: Duration,

    /// Consecutive probe failures treated as a crash
    pub health_failure_threshold: u32,

    /// Respawn budget before a service is abandoned as failed
    pub restart_limit: u32,

    /// Grace period between SIGTERM and SIGKILL on stop
    pub stop_timeout: Duration,

    /// Container runtime binary for container workloads
    pub container_runtime: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs/workloads"),
            startup_timeout: Duration::from_secs(30),
            readiness_poll_interval: Duration::from_millis(500),
            health_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(2),
            health_failure_threshold: 3,
            restart_limit: 3,
            stop_timeout: Duration::from_secs(10),
            container_runtime: "docker".to_string(),
        }
    }
}

/// Status of an executed workload derived from observable state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Completed { exit_code: i32 },
    Failed,
    Stopped { exit_code: i32 },
    Unknown,
}

/// Asynchronous notifications from executors to the workload manager
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    /// A batch child terminated on its own
    Exited {
        workload_id: WorkloadId,
        exit_code: Option<i32>,
    },
    /// A supervised service was respawned after a crash
    Restarted {
        workload_id: WorkloadId,
        restarts: u32,
    },
    /// A supervised service exhausted its restart budget
    Failed {
        workload_id: WorkloadId,
        message: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<ExecutorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ExecutorEvent>;

/// What an executor reports once a workload is running
#[derive(Debug, Clone)]
pub struct StartedWorkload {
    pub pid: Option<u32>,
    pub endpoint: Option<String>,
}

/// Uniform executor contract consumed by the scheduler
#[async_trait]
pub trait WorkloadExecutor: Send + Sync {
    /// Launch the workload; returns once it is running (for services,
    /// after the readiness barrier resolves)
    async fn execute(&self, workload: &Workload) -> Result<StartedWorkload>;

    /// Terminate the workload and its supervision; idempotent
    async fn stop(&self, id: WorkloadId) -> Result<()>;

    /// Last `lines` lines of captured stdout/stderr
    async fn logs(&self, id: WorkloadId, lines: usize) -> Result<Vec<String>>;

    /// Current status derived from observable state
    async fn status(&self, id: WorkloadId) -> ExecutionStatus;
}

/// The executor set, dispatched by workload kind
pub struct ExecutorSet {
    process: Arc<ProcessExecutor>,
    container: Arc<ContainerExecutor>,
    mlmodel: Arc<MlModelExecutor>,
    opencv: Arc<OpenCvExecutor>,
    datagateway: Arc<DataGatewayExecutor>,
}

impl ExecutorSet {
    pub fn new(config: ExecutorConfig, events: EventSender) -> Self {
        let runner = Arc::new(ProcessRunner::new(
            config.log_dir.clone(),
            config.stop_timeout,
        ));
        let supervisor = Arc::new(ServiceSupervisor::new(
            &config,
            Arc::clone(&runner),
            events.clone(),
        ));

        Self {
            process: Arc::new(ProcessExecutor::new(Arc::clone(&runner), events.clone())),
            container: Arc::new(ContainerExecutor::new(
                config.container_runtime.clone(),
                Arc::clone(&runner),
                events,
            )),
            mlmodel: Arc::new(MlModelExecutor::new(Arc::clone(&supervisor))),
            opencv: Arc::new(OpenCvExecutor::new(Arc::clone(&supervisor))),
            datagateway: Arc::new(DataGatewayExecutor::new(supervisor)),
        }
    }

    /// Resolve the executor for a workload kind; `data` workloads are
    /// record-only and have no executor
    pub fn for_kind(&self, kind: WorkloadKind) -> Option<Arc<dyn WorkloadExecutor>> {
        let executor: Arc<dyn WorkloadExecutor> = match kind {
            WorkloadKind::Process => Arc::clone(&self.process) as Arc<dyn WorkloadExecutor>,
            WorkloadKind::Container => Arc::clone(&self.container) as Arc<dyn WorkloadExecutor>,
            WorkloadKind::MlModel => Arc::clone(&self.mlmodel) as Arc<dyn WorkloadExecutor>,
            WorkloadKind::OpenCv => Arc::clone(&self.opencv) as Arc<dyn WorkloadExecutor>,
            WorkloadKind::DataGateway => {
                Arc::clone(&self.datagateway) as Arc<dyn WorkloadExecutor>
            }
            WorkloadKind::Data => return None,
        };
        Some(executor)
    }
}
