//! Service executors: model inference, vision cascades, data gateway
//!
//! Each variant turns its typed config into a child command plus the
//! endpoint to supervise, then hands both to the shared supervisor. The
//! service binaries themselves are external; an explicit `command`
//! override in the config replaces the per-family default binary.

use crate::error::{ExecutorError, Result};
use crate::process::CommandSpec;
use crate::supervise::{ServiceSpec, ServiceSupervisor};
use crate::{ExecutionStatus, StartedWorkload, WorkloadExecutor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use workmesh_shared::workload::{
    CascadeType, DataGatewayConfig, MlModelConfig, ModelType, OpenCvConfig,
};
use workmesh_shared::{Workload, WorkloadId};

const DEFAULT_SERVICE_HOST: &str = "127.0.0.1";
const DEFAULT_MLMODEL_PORT: u16 = 8501;
const DEFAULT_OPENCV_PORT: u16 = 8602;

fn invalid<E: std::fmt::Display>(e: E) -> ExecutorError {
    ExecutorError::InvalidConfig {
        message: e.to_string(),
    }
}

/// Split an explicit command override into program and arguments
fn parse_override(command: &str) -> Result<CommandSpec> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next().ok_or_else(|| ExecutorError::InvalidConfig {
        message: "command override must not be empty".to_string(),
    })?;
    Ok(CommandSpec {
        program,
        args: parts.collect(),
        env: HashMap::new(),
        working_dir: None,
    })
}

fn endpoint_for(host: &str, port: u16) -> String {
    format!("http://{}:{}", host, port)
}

fn service_spec(command: CommandSpec, host: &str, port: u16) -> ServiceSpec {
    let endpoint = endpoint_for(host, port);
    let health_url = format!("{}/health", endpoint);
    ServiceSpec {
        command,
        endpoint,
        health_url,
    }
}

/// Executor for `mlmodel` workloads, dispatching on the model family
pub struct MlModelExecutor {
    supervisor: Arc<ServiceSupervisor>,
}

impl MlModelExecutor {
    pub fn new(supervisor: Arc<ServiceSupervisor>) -> Self {
        Self { supervisor }
    }

    fn build_spec(config: &MlModelConfig) -> Result<ServiceSpec> {
        let port = config.service_port.unwrap_or(DEFAULT_MLMODEL_PORT);
        let host = config.service_host.as_deref().unwrap_or(DEFAULT_SERVICE_HOST);

        let command = match &config.command {
            Some(command) => parse_override(command)?,
            None => {
                let port_arg = port.to_string();
                match config.model_type {
                    ModelType::Yolo => CommandSpec {
                        program: "yolo-serve".to_string(),
                        args: vec![
                            "--model".to_string(),
                            config.model_path.clone(),
                            "--port".to_string(),
                            port_arg,
                        ],
                        env: HashMap::new(),
                        working_dir: None,
                    },
                    ModelType::Tensorflow => CommandSpec {
                        program: "tensorflow-model-server".to_string(),
                        args: vec![
                            "--model_base_path".to_string(),
                            config.model_path.clone(),
                            "--rest_api_port".to_string(),
                            port_arg,
                        ],
                        env: HashMap::new(),
                        working_dir: None,
                    },
                    ModelType::Pytorch => CommandSpec {
                        program: "torchserve".to_string(),
                        args: vec![
                            "--model-store".to_string(),
                            config.model_path.clone(),
                            "--port".to_string(),
                            port_arg,
                        ],
                        env: HashMap::new(),
                        working_dir: None,
                    },
                }
            }
        };

        Ok(service_spec(command, host, port))
    }
}

#[async_trait]
impl WorkloadExecutor for MlModelExecutor {
    async fn execute(&self, workload: &Workload) -> Result<StartedWorkload> {
        let config: MlModelConfig = workload.parsed_config().map_err(invalid)?;
        let spec = Self::build_spec(&config)?;
        let endpoint = spec.endpoint.clone();
        let pid = self.supervisor.start(workload.id, spec).await?;
        Ok(StartedWorkload {
            pid,
            endpoint: Some(endpoint),
        })
    }

    async fn stop(&self, id: WorkloadId) -> Result<()> {
        self.supervisor.stop(id).await
    }

    async fn logs(&self, id: WorkloadId, lines: usize) -> Result<Vec<String>> {
        self.supervisor.logs(id, lines)
    }

    async fn status(&self, id: WorkloadId) -> ExecutionStatus {
        self.supervisor.status(id)
    }
}

/// Executor for `opencv` cascade services
pub struct OpenCvExecutor {
    supervisor: Arc<ServiceSupervisor>,
}

impl OpenCvExecutor {
    pub fn new(supervisor: Arc<ServiceSupervisor>) -> Self {
        Self { supervisor }
    }

    fn build_spec(config: &OpenCvConfig) -> Result<ServiceSpec> {
        let port = config.service_port.unwrap_or(DEFAULT_OPENCV_PORT);
        let host = config.service_host.as_deref().unwrap_or(DEFAULT_SERVICE_HOST);

        let command = match &config.command {
            Some(command) => parse_override(command)?,
            None => {
                let cascade = match config.cascade_type {
                    CascadeType::Face => "face",
                    CascadeType::Eye => "eye",
                    CascadeType::Smile => "smile",
                };
                let mut args = vec![
                    "--cascade".to_string(),
                    cascade.to_string(),
                    "--port".to_string(),
                    port.to_string(),
                ];
                if let Some(path) = &config.cascade_path {
                    args.push("--cascade-path".to_string());
                    args.push(path.clone());
                }
                CommandSpec {
                    program: "opencv-serve".to_string(),
                    args,
                    env: HashMap::new(),
                    working_dir: None,
                }
            }
        };

        Ok(service_spec(command, host, port))
    }
}

#[async_trait]
impl WorkloadExecutor for OpenCvExecutor {
    async fn execute(&self, workload: &Workload) -> Result<StartedWorkload> {
        let config: OpenCvConfig = workload.parsed_config().map_err(invalid)?;
        let spec = Self::build_spec(&config)?;
        let endpoint = spec.endpoint.clone();
        let pid = self.supervisor.start(workload.id, spec).await?;
        Ok(StartedWorkload {
            pid,
            endpoint: Some(endpoint),
        })
    }

    async fn stop(&self, id: WorkloadId) -> Result<()> {
        self.supervisor.stop(id).await
    }

    async fn logs(&self, id: WorkloadId, lines: usize) -> Result<Vec<String>> {
        self.supervisor.logs(id, lines)
    }

    async fn status(&self, id: WorkloadId) -> ExecutionStatus {
        self.supervisor.status(id)
    }
}

/// Executor for the read-only data gateway service
pub struct DataGatewayExecutor {
    supervisor: Arc<ServiceSupervisor>,
}

impl DataGatewayExecutor {
    pub fn new(supervisor: Arc<ServiceSupervisor>) -> Self {
        Self { supervisor }
    }

    fn build_spec(config: &DataGatewayConfig) -> Result<ServiceSpec> {
        let mut command = match &config.command {
            Some(command) => parse_override(command)?,
            None => CommandSpec {
                program: "data-gateway".to_string(),
                args: vec![
                    "--host".to_string(),
                    config.service_host.clone(),
                    "--port".to_string(),
                    config.service_port.to_string(),
                    "--base-path".to_string(),
                    config.base_path.clone(),
                    "--bucket".to_string(),
                    config.bucket.clone(),
                ],
                env: HashMap::new(),
                working_dir: None,
            },
        };

        // the token travels in the environment, never on the command line
        if let Some(token) = &config.auth_token {
            command
                .env
                .insert("GATEWAY_AUTH_TOKEN".to_string(), token.clone());
        }

        Ok(service_spec(
            command,
            &config.service_host,
            config.service_port,
        ))
    }
}

#[async_trait]
impl WorkloadExecutor for DataGatewayExecutor {
    async fn execute(&self, workload: &Workload) -> Result<StartedWorkload> {
        let config: DataGatewayConfig = workload.parsed_config().map_err(invalid)?;
        let spec = Self::build_spec(&config)?;
        let endpoint = spec.endpoint.clone();
        let pid = self.supervisor.start(workload.id, spec).await?;
        Ok(StartedWorkload {
            pid,
            endpoint: Some(endpoint),
        })
    }

    async fn stop(&self, id: WorkloadId) -> Result<()> {
        self.supervisor.stop(id).await
    }

    async fn logs(&self, id: WorkloadId, lines: usize) -> Result<Vec<String>> {
        self.supervisor.logs(id, lines)
    }

    async fn status(&self, id: WorkloadId) -> ExecutionStatus {
        self.supervisor.status(id)
    }
}
