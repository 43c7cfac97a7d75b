//! Workload model: submissions, records and kind-specific configuration

use crate::error::AgentError;
use crate::id::{NodeId, WorkloadId};
use crate::resources::ResourceVector;
use crate::time::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Workload kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Process,
    Container,
    MlModel,
    OpenCv,
    DataGateway,
    Data,
}

impl WorkloadKind {
    /// Service kinds supervise a child process behind a health-checked
    /// HTTP endpoint
    pub fn is_service(&self) -> bool {
        matches!(
            self,
            WorkloadKind::MlModel | WorkloadKind::OpenCv | WorkloadKind::DataGateway
        )
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadKind::Process => "process",
            WorkloadKind::Container => "container",
            WorkloadKind::MlModel => "mlmodel",
            WorkloadKind::OpenCv => "opencv",
            WorkloadKind::DataGateway => "datagateway",
            WorkloadKind::Data => "data",
        };
        write!(f, "{}", s)
    }
}

/// Workload lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl WorkloadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkloadStatus::Completed | WorkloadStatus::Failed | WorkloadStatus::Stopped
        )
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadStatus::Pending => "pending",
            WorkloadStatus::Scheduled => "scheduled",
            WorkloadStatus::Running => "running",
            WorkloadStatus::Completed => "completed",
            WorkloadStatus::Failed => "failed",
            WorkloadStatus::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Where a workload executes: on this node or forwarded to a remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Placement {
    Local,
    Delegated {
        node: NodeId,
        remote_id: WorkloadId,
    },
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Local => write!(f, "local"),
            Placement::Delegated { node, .. } => write!(f, "delegated_to:{}", node),
        }
    }
}

/// A workload submission as it arrives on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: WorkloadKind,

    #[serde(default)]
    pub requirements: ResourceVector,

    /// Kind-specific configuration, parsed into a typed struct by the
    /// executor for the kind
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl WorkloadSpec {
    /// Validate the parts of a submission that do not depend on kind
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.name.trim().is_empty() {
            return Err(AgentError::InvalidRequest {
                message: "workload name must not be empty".to_string(),
            });
        }
        if self.requirements.cpu < 0.0 || !self.requirements.cpu.is_finite() {
            return Err(AgentError::InvalidRequest {
                message: "cpu requirement must be a non-negative number".to_string(),
            });
        }
        Ok(())
    }
}

/// A workload record as tracked by the workload manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    pub id: WorkloadId,
    pub name: String,

    #[serde(rename = "type")]
    pub kind: WorkloadKind,

    pub requirements: ResourceVector,

    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,

    pub status: WorkloadStatus,
    pub placement: Placement,

    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// For service workloads: the supervised endpoint URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_pid: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,

    /// Times the supervisor respawned the underlying service process
    #[serde(default)]
    pub restarts: u32,
}

impl Workload {
    /// Create a pending record from a validated submission
    pub fn from_spec(spec: WorkloadSpec) -> Self {
        Self {
            id: WorkloadId::random(),
            name: spec.name,
            kind: spec.kind,
            requirements: spec.requirements,
            config: spec.config,
            status: WorkloadStatus::Pending,
            placement: Placement::Local,
            created_at: Timestamp::now(),
            started_at: None,
            stopped_at: None,
            exit_code: None,
            endpoint: None,
            process_pid: None,
            results: None,
            restarts: 0,
        }
    }

    /// Parse the kind-specific config into a typed struct
    pub fn parsed_config<T: DeserializeOwned>(&self) -> Result<T, AgentError> {
        serde_json::from_value(serde_json::Value::Object(self.config.clone())).map_err(|e| {
            AgentError::InvalidRequest {
                message: format!("invalid {} config: {}", self.kind, e),
            }
        })
    }

    /// The submission view of this record, as forwarded on delegation
    pub fn to_spec(&self) -> WorkloadSpec {
        WorkloadSpec {
            name: self.name.clone(),
            kind: self.kind,
            requirements: self.requirements,
            config: self.config.clone(),
        }
    }
}

/// Config for `process` workloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// Config for `container` workloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub image: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Model families the mlmodel dispatcher recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Yolo,
    Tensorflow,
    Pytorch,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelType::Yolo => "yolo",
            ModelType::Tensorflow => "tensorflow",
            ModelType::Pytorch => "pytorch",
        };
        write!(f, "{}", s)
    }
}

/// Config for `mlmodel` workloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlModelConfig {
    pub model_type: ModelType,
    pub model_path: String,
    #[serde(default)]
    pub service_port: Option<u16>,
    #[serde(default)]
    pub service_host: Option<String>,
    /// Explicit launch command overriding the per-family default binary
    #[serde(default)]
    pub command: Option<String>,
}

/// Cascade families the opencv executor recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeType {
    Face,
    Eye,
    Smile,
}

impl fmt::Display for CascadeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CascadeType::Face => "face",
            CascadeType::Eye => "eye",
            CascadeType::Smile => "smile",
        };
        write!(f, "{}", s)
    }
}

/// Config for `opencv` workloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenCvConfig {
    pub cascade_type: CascadeType,
    #[serde(default)]
    pub cascade_path: Option<String>,
    #[serde(default)]
    pub service_port: Option<u16>,
    #[serde(default)]
    pub service_host: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

/// Config for `datagateway` workloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataGatewayConfig {
    pub service_port: u16,
    pub service_host: String,
    pub base_path: String,
    pub bucket: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec_from_json(v: serde_json::Value) -> WorkloadSpec {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_submission_parsing() {
        let spec = spec_from_json(json!({
            "name": "train-job",
            "type": "process",
            "requirements": {"cpu": 1.0, "memory": 536870912},
            "config": {"command": "sleep", "args": ["60"]}
        }));
        assert_eq!(spec.kind, WorkloadKind::Process);
        assert_eq!(spec.requirements.cpu, 1.0);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let spec = spec_from_json(json!({"name": "  ", "type": "process"}));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_kind_wire_names() {
        for (kind, wire) in [
            (WorkloadKind::Process, "\"process\""),
            (WorkloadKind::MlModel, "\"mlmodel\""),
            (WorkloadKind::OpenCv, "\"opencv\""),
            (WorkloadKind::DataGateway, "\"datagateway\""),
        ] {
            assert_eq!(serde_json::to_string(&kind).unwrap(), wire);
        }
    }

    #[test]
    fn test_parsed_config_typed() {
        let spec = spec_from_json(json!({
            "name": "detector",
            "type": "mlmodel",
            "config": {"model_type": "yolo", "model_path": "/models/v8.onnx", "service_port": 9001}
        }));
        let workload = Workload::from_spec(spec);
        let cfg: MlModelConfig = workload.parsed_config().unwrap();
        assert_eq!(cfg.model_type, ModelType::Yolo);
        assert_eq!(cfg.service_port, Some(9001));
    }

    #[test]
    fn test_parsed_config_rejects_unknown_model_type() {
        let spec = spec_from_json(json!({
            "name": "detector",
            "type": "mlmodel",
            "config": {"model_type": "caffe", "model_path": "/m"}
        }));
        let workload = Workload::from_spec(spec);
        let parsed: Result<MlModelConfig, _> = workload.parsed_config();
        assert!(parsed.is_err());
    }

    #[test]
    fn test_record_round_trip_preserves_spec_fields() {
        let spec = spec_from_json(json!({
            "name": "gw",
            "type": "datagateway",
            "requirements": {"cpu": 0.5},
            "config": {"service_port": 7070, "service_host": "127.0.0.1",
                       "base_path": "/data", "bucket": "models"}
        }));
        let workload = Workload::from_spec(spec.clone());
        let json = serde_json::to_string(&workload).unwrap();
        let parsed: Workload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, spec.name);
        assert_eq!(parsed.kind, spec.kind);
        assert_eq!(parsed.requirements, spec.requirements);
        assert_eq!(parsed.config, spec.config);
        assert_eq!(parsed.status, WorkloadStatus::Pending);
    }

    #[test]
    fn test_placement_display() {
        let local = Placement::Local;
        assert_eq!(local.to_string(), "local");

        let delegated = Placement::Delegated {
            node: NodeId::from("child-1"),
            remote_id: WorkloadId::random(),
        };
        assert_eq!(delegated.to_string(), "delegated_to:child-1");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(WorkloadStatus::Completed.is_terminal());
        assert!(WorkloadStatus::Failed.is_terminal());
        assert!(WorkloadStatus::Stopped.is_terminal());
        assert!(!WorkloadStatus::Running.is_terminal());
        assert!(!WorkloadStatus::Pending.is_terminal());
    }
}
