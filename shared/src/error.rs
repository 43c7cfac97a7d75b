//! Error types and handling for workmesh components

/// Result type alias for workmesh operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Primary error type surfaced by the agent core
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("insufficient local resources: need {required}, available {available}")]
    InsufficientResources { required: String, available: String },

    #[error("no local or remote capacity for workload")]
    NoCapacity,

    #[error("delegation target unreachable: {message}")]
    DelegationUnreachable { message: String },

    #[error("workload not found: {id}")]
    WorkloadNotFound { id: String },

    #[error("node not found: {id}")]
    NodeNotFound { id: String },

    #[error("executor startup failed: {message}")]
    Startup { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AgentError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::InsufficientResources { .. }
                | AgentError::NoCapacity
                | AgentError::DelegationUnreachable { .. }
                | AgentError::Network(_)
                | AgentError::Timeout { .. }
        )
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::InvalidRequest { .. } => "invalid_request",
            AgentError::InsufficientResources { .. } => "insufficient_resources",
            AgentError::NoCapacity => "no_capacity",
            AgentError::DelegationUnreachable { .. } => "delegation_unreachable",
            AgentError::WorkloadNotFound { .. } => "workload_not_found",
            AgentError::NodeNotFound { .. } => "node_not_found",
            AgentError::Startup { .. } => "startup",
            AgentError::Conflict { .. } => "conflict",
            AgentError::Config(_) => "config",
            AgentError::Network(_) => "network",
            AgentError::Serialization(_) => "serialization",
            AgentError::Timeout { .. } => "timeout",
            AgentError::Internal { .. } => "internal",
        }
    }

    /// HTTP status code this error maps to at the API surface
    pub fn http_status(&self) -> u16 {
        match self {
            AgentError::InvalidRequest { .. } | AgentError::Serialization(_) => 400,
            AgentError::WorkloadNotFound { .. } | AgentError::NodeNotFound { .. } => 404,
            AgentError::Conflict { .. } => 409,
            AgentError::NoCapacity | AgentError::InsufficientResources { .. } => 503,
            AgentError::DelegationUnreachable { .. } => 502,
            AgentError::Timeout { .. } => 504,
            _ => 500,
        }
    }
}
