//! Registry error types

use workmesh_shared::{AgentError, ResourceVector};

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Registry-specific error types
///
/// The registry surfaces exactly one failure to callers: an allocation
/// that does not fit the available ledger.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("insufficient resources: need {required}, available {available}")]
    InsufficientResources {
        required: ResourceVector,
        available: ResourceVector,
    },
}

impl From<RegistryError> for AgentError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InsufficientResources {
                required,
                available,
            } => AgentError::InsufficientResources {
                required: required.to_string(),
                available: available.to_string(),
            },
        }
    }
}
