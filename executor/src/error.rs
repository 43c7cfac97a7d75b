//! Executor error types

use std::time::Duration;
use workmesh_shared::{AgentError, WorkloadId};

/// Result type alias for executor operations
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Executor-specific error types
#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    #[error("service did not become ready within {timeout:?}")]
    ReadinessTimeout { timeout: Duration },

    #[error("invalid workload config: {message}")]
    InvalidConfig { message: String },

    #[error("no executor for workload kind: {kind}")]
    UnsupportedKind { kind: String },

    #[error("workload has no tracked process: {id}")]
    NotTracked { id: WorkloadId },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExecutorError> for AgentError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::InvalidConfig { message } => AgentError::InvalidRequest { message },
            ExecutorError::UnsupportedKind { kind } => AgentError::InvalidRequest {
                message: format!("unsupported workload kind: {}", kind),
            },
            ExecutorError::NotTracked { id } => AgentError::WorkloadNotFound { id: id.to_string() },
            other => AgentError::Startup {
                message: other.to_string(),
            },
        }
    }
}
