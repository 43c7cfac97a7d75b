//! Container executor shelling out to a container runtime

use crate::error::{ExecutorError, Result};
use crate::process::{CommandSpec, ProcessRunner};
use crate::{EventSender, ExecutionStatus, StartedWorkload, WorkloadExecutor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use workmesh_shared::workload::ContainerConfig;
use workmesh_shared::{ResourceVector, Workload, WorkloadId};

/// Executor for `container` workloads
///
/// Invokes the configured runtime binary in the foreground so the child
/// handle tracks the container lifetime; resource requirements are
/// passed as runtime flags (accounting only, the registry remains the
/// arbiter).
pub struct ContainerExecutor {
    runtime: String,
    runner: Arc<ProcessRunner>,
    events: EventSender,
}

impl ContainerExecutor {
    pub fn new(runtime: String, runner: Arc<ProcessRunner>, events: EventSender) -> Self {
        Self {
            runtime,
            runner,
            events,
        }
    }

    fn build_command(
        &self,
        id: WorkloadId,
        config: &ContainerConfig,
        requirements: &ResourceVector,
    ) -> CommandSpec {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            format!("workmesh-{}", id),
        ];

        if requirements.cpu > 0.0 {
            args.push(format!("--cpus={}", requirements.cpu));
        }
        if requirements.memory > 0 {
            args.push(format!("--memory={}", requirements.memory));
        }
        if requirements.gpu > 0 {
            args.push(format!("--gpus={}", requirements.gpu));
        }
        for (key, value) in &config.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(config.image.clone());
        if let Some(command) = &config.command {
            args.push(command.clone());
        }
        args.extend(config.args.iter().cloned());

        CommandSpec {
            program: self.runtime.clone(),
            args,
            env: HashMap::new(),
            working_dir: None,
        }
    }
}

#[async_trait]
impl WorkloadExecutor for ContainerExecutor {
    async fn execute(&self, workload: &Workload) -> Result<StartedWorkload> {
        let config: ContainerConfig =
            workload
                .parsed_config()
                .map_err(|e| ExecutorError::InvalidConfig {
                    message: e.to_string(),
                })?;

        let spec = self.build_command(workload.id, &config, &workload.requirements);
        let pid = self.runner.spawn(workload.id, &spec).await?;
        self.runner.watch(workload.id, self.events.clone());

        Ok(StartedWorkload {
            pid,
            endpoint: None,
        })
    }

    async fn stop(&self, id: WorkloadId) -> Result<()> {
        self.runner.stop(id).await
    }

    async fn logs(&self, id: WorkloadId, lines: usize) -> Result<Vec<String>> {
        self.runner.logs(id, lines)
    }

    async fn status(&self, id: WorkloadId) -> ExecutionStatus {
        self.runner.status(id)
    }
}
