//! Process supervision for service workloads
//!
//! Services are child processes exposing an HTTP `/health` endpoint.
//! After spawning, the supervisor polls health until the readiness
//! barrier resolves, then keeps probing on an interval; consecutive
//! failures are treated as a crash and the child is respawned with the
//! same arguments up to a bounded restart budget.

use crate::error::{ExecutorError, Result};
use crate::process::{CommandSpec, ProcessRunner};
use crate::{EventSender, ExecutionStatus, ExecutorConfig, ExecutorEvent};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use workmesh_shared::WorkloadId;

/// A service child to supervise
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub command: CommandSpec,
    /// URL returned to the submitter and used for supervision
    pub endpoint: String,
    pub health_url: String,
}

#[derive(Debug, Clone)]
struct SupervisionConfig {
    startup_timeout: Duration,
    readiness_poll_interval: Duration,
    health_interval: Duration,
    probe_timeout: Duration,
    failure_threshold: u32,
    restart_limit: u32,
}

/// Supervises service children shared by all service executors
pub struct ServiceSupervisor {
    config: SupervisionConfig,
    client: reqwest::Client,
    runner: Arc<ProcessRunner>,
    events: EventSender,
    watchers: DashMap<WorkloadId, CancellationToken>,
}

impl ServiceSupervisor {
    pub fn new(config: &ExecutorConfig, runner: Arc<ProcessRunner>, events: EventSender) -> Self {
        Self {
            config: SupervisionConfig {
                startup_timeout: config.startup_timeout,
                readiness_poll_interval: config.readiness_poll_interval,
                health_interval: config.health_interval,
                probe_timeout: config.probe_timeout,
                failure_threshold: config.health_failure_threshold,
                restart_limit: config.restart_limit,
            },
            client: reqwest::Client::new(),
            runner,
            events,
            watchers: DashMap::new(),
        }
    }

    /// Spawn the service child and hold the readiness barrier; on
    /// success the health loop takes over and the child pid is returned
    pub(crate) async fn start(
        self: &Arc<Self>,
        id: WorkloadId,
        spec: ServiceSpec,
    ) -> Result<Option<u32>> {
        let pid = self.runner.spawn(id, &spec.command).await?;

        if !self.await_ready(&spec.health_url).await {
            warn!(
                "service {} failed readiness within {:?}, killing child",
                id, self.config.startup_timeout
            );
            self.runner.kill(id).await;
            return Err(ExecutorError::ReadinessTimeout {
                timeout: self.config.startup_timeout,
            });
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.watchers.insert(id, token.clone()) {
            previous.cancel();
        }

        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor.health_loop(id, spec, token).await;
        });

        Ok(pid)
    }

    /// Cancel supervision and terminate the child; idempotent
    pub(crate) async fn stop(&self, id: WorkloadId) -> Result<()> {
        if let Some((_, token)) = self.watchers.remove(&id) {
            token.cancel();
        }
        self.runner.stop(id).await
    }

    pub(crate) fn status(&self, id: WorkloadId) -> ExecutionStatus {
        self.runner.status(id)
    }

    pub(crate) fn logs(&self, id: WorkloadId, lines: usize) -> Result<Vec<String>> {
        self.runner.logs(id, lines)
    }

    async fn probe(&self, url: &str) -> bool {
        match self
            .client
            .get(url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Poll health until it succeeds or the startup window expires
    async fn await_ready(&self, health_url: &str) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.startup_timeout;
        loop {
            if self.probe(health_url).await {
                return true;
            }
            if tokio::time::Instant::now() + self.config.readiness_poll_interval > deadline {
                return false;
            }
            tokio::time::sleep(self.config.readiness_poll_interval).await;
        }
    }

    async fn health_loop(self: Arc<Self>, id: WorkloadId, spec: ServiceSpec, token: CancellationToken) {
        let mut consecutive_failures = 0u32;
        let mut restarts = 0u32;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("supervision of {} cancelled", id);
                    break;
                }
                _ = tokio::time::sleep(self.config.health_interval) => {}
            }

            if self.probe(&spec.health_url).await {
                consecutive_failures = 0;
                continue;
            }

            consecutive_failures += 1;
            debug!(
                "health probe failed for {} ({}/{})",
                id, consecutive_failures, self.config.failure_threshold
            );
            if consecutive_failures < self.config.failure_threshold {
                continue;
            }

            warn!(
                "service {} presumed crashed after {} failed probes",
                id, consecutive_failures
            );
            self.runner.kill(id).await;

            let mut revived = false;
            while restarts < self.config.restart_limit {
                restarts += 1;
                match self.runner.spawn(id, &spec.command).await {
                    Ok(_) => {
                        if self.await_ready(&spec.health_url).await {
                            info!("service {} respawned (restart {})", id, restarts);
                            let _ = self.events.send(ExecutorEvent::Restarted {
                                workload_id: id,
                                restarts,
                            });
                            revived = true;
                            break;
                        }
                        self.runner.kill(id).await;
                    }
                    Err(e) => {
                        warn!("respawn of service {} failed: {}", id, e);
                    }
                }
            }

            if !revived {
                warn!(
                    "service {} abandoned after {} restart attempts",
                    id, restarts
                );
                self.runner.set_status(id, ExecutionStatus::Failed);
                let _ = self.events.send(ExecutorEvent::Failed {
                    workload_id: id,
                    message: format!("restart budget exhausted after {} attempts", restarts),
                });
                self.watchers.remove(&id);
                break;
            }
            consecutive_failures = 0;
        }
    }
}
