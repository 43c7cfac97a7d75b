//! Scheduler error types

use workmesh_executor::ExecutorError;
use workmesh_shared::{AgentError, NodeId};

/// Result type alias for scheduler operations
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Scheduler-specific error types
#[derive(thiserror::Error, Debug)]
pub enum ScheduleError {
    #[error("no local or remote capacity for workload")]
    NoCapacity,

    #[error("delegation to {node} failed: {message}")]
    DelegationUnreachable { node: NodeId, message: String },

    #[error("executor startup failed: {message}")]
    Startup { message: String },

    #[error("invalid workload: {message}")]
    InvalidWorkload { message: String },
}

impl From<ExecutorError> for ScheduleError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::InvalidConfig { message } => ScheduleError::InvalidWorkload { message },
            ExecutorError::UnsupportedKind { kind } => ScheduleError::InvalidWorkload {
                message: format!("unsupported workload kind: {}", kind),
            },
            other => ScheduleError::Startup {
                message: other.to_string(),
            },
        }
    }
}

impl From<ScheduleError> for AgentError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::NoCapacity => AgentError::NoCapacity,
            ScheduleError::DelegationUnreachable { node, message } => {
                AgentError::DelegationUnreachable {
                    message: format!("{}: {}", node, message),
                }
            }
            ScheduleError::Startup { message } => AgentError::Startup { message },
            ScheduleError::InvalidWorkload { message } => AgentError::InvalidRequest { message },
        }
    }
}
