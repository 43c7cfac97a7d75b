//! Workload manager: the agent's workload table and lifecycle driver
//!
//! The manager owns the only mutable workload table. Lock order is
//! workload table → allocations → registry, and no HTTP call ever runs
//! under any of them.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use workmesh_executor::{EventReceiver, ExecutionStatus, ExecutorEvent, ExecutorSet};
use workmesh_registry::{AllocationHandle, ResourceRegistry};
use workmesh_scheduler::{PlacementOutcome, Scheduler};
use workmesh_shared::{
    AgentError, Placement, Timestamp, Workload, WorkloadId, WorkloadKind, WorkloadSpec,
    WorkloadStatus,
};

pub struct WorkloadManager {
    registry: Arc<ResourceRegistry>,
    scheduler: Scheduler,
    executors: Arc<ExecutorSet>,
    workloads: RwLock<HashMap<WorkloadId, Workload>>,
    allocations: Mutex<HashMap<WorkloadId, AllocationHandle>>,
}

impl WorkloadManager {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        scheduler: Scheduler,
        executors: Arc<ExecutorSet>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            scheduler,
            executors,
            workloads: RwLock::new(HashMap::new()),
            allocations: Mutex::new(HashMap::new()),
        })
    }

    /// Validate, record and place a submission
    pub async fn submit(&self, spec: WorkloadSpec) -> Result<Workload, AgentError> {
        spec.validate()?;
        let mut record = Workload::from_spec(spec);

        if record.kind == WorkloadKind::Data {
            // record-only kind: retained for inspection, nothing runs
            let now = Timestamp::now();
            record.status = WorkloadStatus::Completed;
            record.started_at = Some(now);
            record.stopped_at = Some(now);
            self.workloads
                .write()
                .await
                .insert(record.id, record.clone());
            return Ok(record);
        }

        self.workloads
            .write()
            .await
            .insert(record.id, record.clone());

        match self.scheduler.place(&record).await {
            Ok(PlacementOutcome::Local { handle, started }) => {
                self.allocations.lock().await.insert(record.id, handle);

                let stopped_during_startup = {
                    let mut workloads = self.workloads.write().await;
                    match workloads.get_mut(&record.id) {
                        Some(stored) if stored.status.is_terminal() => true,
                        Some(stored) => {
                            stored.status = WorkloadStatus::Running;
                            stored.started_at = Some(Timestamp::now());
                            stored.process_pid = started.pid;
                            stored.endpoint = started.endpoint.clone();
                            stored.placement = Placement::Local;
                            record = stored.clone();
                            false
                        }
                        None => true,
                    }
                };

                if stopped_during_startup {
                    // a concurrent stop or delete won the race
                    let _ = self.stop_local_process(record.id, record.kind).await;
                    self.release_allocation(record.id).await;
                }
                Ok(record)
            }
            Ok(PlacementOutcome::Delegated { node, remote, .. }) => {
                let mut workloads = self.workloads.write().await;
                if let Some(stored) = workloads.get_mut(&record.id) {
                    stored.status = match remote.status {
                        WorkloadStatus::Pending => WorkloadStatus::Scheduled,
                        other => other,
                    };
                    stored.endpoint = remote.endpoint.clone();
                    stored.placement = Placement::Delegated {
                        node,
                        remote_id: remote.id,
                    };
                    record = stored.clone();
                }
                Ok(record)
            }
            Err(e) => {
                let mut workloads = self.workloads.write().await;
                if let Some(stored) = workloads.get_mut(&record.id) {
                    stored.status = WorkloadStatus::Failed;
                    stored.stopped_at = Some(Timestamp::now());
                }
                Err(e.into())
            }
        }
    }

    /// Inspect a workload; delegated non-terminal records are refreshed
    /// from the remote on demand, best-effort
    pub async fn get(&self, id: WorkloadId) -> Result<Workload, AgentError> {
        let record = self
            .workloads
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AgentError::WorkloadNotFound { id: id.to_string() })?;

        if matches!(record.placement, Placement::Delegated { .. }) && !record.status.is_terminal()
        {
            return Ok(self.refresh_delegated(record).await);
        }
        Ok(record)
    }

    pub async fn list(&self) -> Vec<Workload> {
        let mut records: Vec<Workload> = self.workloads.read().await.values().cloned().collect();
        records.sort_by_key(|w| w.created_at);
        records
    }

    /// Stop a workload; repeat stops of a terminal record are no-ops
    pub async fn stop(&self, id: WorkloadId) -> Result<Workload, AgentError> {
        let record = self
            .workloads
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AgentError::WorkloadNotFound { id: id.to_string() })?;

        if record.status.is_terminal() {
            return Ok(record);
        }

        let exit_code = match record.placement.clone() {
            Placement::Delegated { node, remote_id } => {
                if let Some(address) = self.address_of(&node).await {
                    if let Err(e) = self
                        .scheduler
                        .delegation()
                        .stop(&node, &address, remote_id)
                        .await
                    {
                        warn!("stop of delegated workload {} failed: {}", id, e);
                    }
                }
                None
            }
            Placement::Local => {
                let code = self.stop_local_process(id, record.kind).await;
                self.release_allocation(id).await;
                code
            }
        };

        let mut workloads = self.workloads.write().await;
        let stored = workloads
            .get_mut(&id)
            .ok_or_else(|| AgentError::WorkloadNotFound { id: id.to_string() })?;
        stored.status = WorkloadStatus::Stopped;
        stored.stopped_at = Some(Timestamp::now());
        if stored.exit_code.is_none() {
            stored.exit_code = exit_code;
        }
        info!("workload {} stopped", id);
        Ok(stored.clone())
    }

    /// Remove a terminal record; live workloads must be stopped first
    pub async fn delete(&self, id: WorkloadId) -> Result<(), AgentError> {
        let mut workloads = self.workloads.write().await;
        let record = workloads
            .get(&id)
            .ok_or_else(|| AgentError::WorkloadNotFound { id: id.to_string() })?;

        if !record.status.is_terminal() {
            return Err(AgentError::Conflict {
                message: format!("workload {} is {}; stop it before deleting", id, record.status),
            });
        }
        workloads.remove(&id);
        info!("workload {} deleted", id);
        Ok(())
    }

    /// Tail the captured output of a workload
    pub async fn logs(&self, id: WorkloadId, lines: usize) -> Result<Vec<String>, AgentError> {
        let record = self
            .workloads
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AgentError::WorkloadNotFound { id: id.to_string() })?;

        match record.placement.clone() {
            Placement::Local => match self.executors.for_kind(record.kind) {
                Some(executor) => Ok(executor.logs(id, lines).await?),
                None => Ok(Vec::new()),
            },
            Placement::Delegated { node, remote_id } => {
                let address =
                    self.address_of(&node)
                        .await
                        .ok_or_else(|| AgentError::DelegationUnreachable {
                            message: format!("delegation target {} is no longer known", node),
                        })?;
                Ok(self
                    .scheduler
                    .delegation()
                    .logs(&node, &address, remote_id, lines)
                    .await
                    .map_err(AgentError::from)?)
            }
        }
    }

    /// Stop every local non-terminal workload; used at shutdown
    pub async fn stop_all(&self) {
        let ids: Vec<WorkloadId> = self
            .workloads
            .read()
            .await
            .values()
            .filter(|w| w.placement == Placement::Local && !w.status.is_terminal())
            .map(|w| w.id)
            .collect();

        for id in ids {
            if let Err(e) = self.stop(id).await {
                warn!("stopping workload {} at shutdown failed: {}", id, e);
            }
        }
    }

    /// Consume executor events until shutdown
    pub fn start_event_loop(
        self: &Arc<Self>,
        mut events: EventReceiver,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        manager.handle_event(event).await;
                    }
                }
            }
        })
    }

    async fn handle_event(&self, event: ExecutorEvent) {
        match event {
            ExecutorEvent::Exited {
                workload_id,
                exit_code,
            } => {
                {
                    let mut workloads = self.workloads.write().await;
                    if let Some(stored) = workloads.get_mut(&workload_id) {
                        if !stored.status.is_terminal() {
                            stored.status = if exit_code == Some(0) {
                                WorkloadStatus::Completed
                            } else {
                                WorkloadStatus::Failed
                            };
                            stored.exit_code = exit_code;
                            stored.stopped_at = Some(Timestamp::now());
                        }
                    }
                }
                self.release_allocation(workload_id).await;
            }
            ExecutorEvent::Restarted {
                workload_id,
                restarts,
            } => {
                let mut workloads = self.workloads.write().await;
                if let Some(stored) = workloads.get_mut(&workload_id) {
                    stored.restarts = restarts;
                }
            }
            ExecutorEvent::Failed {
                workload_id,
                message,
            } => {
                {
                    let mut workloads = self.workloads.write().await;
                    if let Some(stored) = workloads.get_mut(&workload_id) {
                        if !stored.status.is_terminal() {
                            stored.status = WorkloadStatus::Failed;
                            stored.stopped_at = Some(Timestamp::now());
                            stored.results =
                                Some(serde_json::json!({ "error": message }));
                        }
                    }
                }
                self.release_allocation(workload_id).await;
            }
        }
    }

    async fn stop_local_process(&self, id: WorkloadId, kind: WorkloadKind) -> Option<i32> {
        let executor = self.executors.for_kind(kind)?;
        if let Err(e) = executor.stop(id).await {
            warn!("executor stop for {} failed: {}", id, e);
            return None;
        }
        match executor.status(id).await {
            ExecutionStatus::Stopped { exit_code } => Some(exit_code),
            ExecutionStatus::Completed { exit_code } => Some(exit_code),
            _ => None,
        }
    }

    async fn release_allocation(&self, id: WorkloadId) {
        if let Some(handle) = self.allocations.lock().await.remove(&id) {
            self.registry.release(handle);
        }
    }

    async fn address_of(&self, node: &workmesh_shared::NodeId) -> Option<String> {
        self.registry
            .snapshot()
            .remotes
            .iter()
            .find(|n| &n.node_id == node)
            .map(|n| n.address.clone())
    }

    async fn refresh_delegated(&self, mut record: Workload) -> Workload {
        let Placement::Delegated { node, remote_id } = record.placement.clone() else {
            return record;
        };
        let Some(address) = self.address_of(&node).await else {
            return record;
        };

        match self
            .scheduler
            .delegation()
            .fetch(&node, &address, remote_id)
            .await
        {
            Ok(remote) => {
                let mut workloads = self.workloads.write().await;
                if let Some(stored) = workloads.get_mut(&record.id) {
                    stored.status = remote.status;
                    stored.exit_code = remote.exit_code;
                    stored.endpoint = remote.endpoint;
                    stored.started_at = remote.started_at;
                    stored.stopped_at = remote.stopped_at;
                    stored.results = remote.results;
                    stored.restarts = remote.restarts;
                    record = stored.clone();
                }
            }
            Err(e) => debug!("remote refresh of {} failed: {}", record.id, e),
        }
        record
    }
}
