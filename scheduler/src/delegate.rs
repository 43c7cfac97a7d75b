//! HTTP client for forwarding workloads to remote nodes

use crate::error::ScheduleError;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use workmesh_shared::{NodeId, Workload, WorkloadId, WorkloadSpec};

#[derive(Debug, Deserialize)]
struct LogsResponse {
    logs: Vec<String>,
}

/// Client for the remote submission endpoint
///
/// Every call is bounded by a per-request timeout; failures surface as
/// `DelegationUnreachable` and are never retried here, the caller may
/// resubmit.
pub struct DelegationClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl DelegationClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn unreachable(node: &NodeId, message: impl ToString) -> ScheduleError {
        ScheduleError::DelegationUnreachable {
            node: node.clone(),
            message: message.to_string(),
        }
    }

    /// POST the workload definition to the node's submission endpoint;
    /// the accepted remote record carries the remote workload id
    pub async fn submit(
        &self,
        node: &NodeId,
        address: &str,
        spec: &WorkloadSpec,
    ) -> Result<Workload, ScheduleError> {
        let url = format!("http://{}/api/workloads", address);
        debug!("delegating workload {} to {}", spec.name, url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(spec)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;

        if !response.status().is_success() {
            return Err(Self::unreachable(
                node,
                format!("submission rejected with status {}", response.status()),
            ));
        }

        response
            .json::<Workload>()
            .await
            .map_err(|e| Self::unreachable(node, format!("invalid submission response: {}", e)))
    }

    /// Fetch the remote record for a delegated workload
    pub async fn fetch(
        &self,
        node: &NodeId,
        address: &str,
        remote_id: WorkloadId,
    ) -> Result<Workload, ScheduleError> {
        let url = format!("http://{}/api/workloads/{}", address, remote_id);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;

        if !response.status().is_success() {
            return Err(Self::unreachable(
                node,
                format!("status fetch rejected with {}", response.status()),
            ));
        }

        response
            .json::<Workload>()
            .await
            .map_err(|e| Self::unreachable(node, format!("invalid status response: {}", e)))
    }

    /// Tail the remote capture of a delegated workload
    pub async fn logs(
        &self,
        node: &NodeId,
        address: &str,
        remote_id: WorkloadId,
        lines: usize,
    ) -> Result<Vec<String>, ScheduleError> {
        let url = format!(
            "http://{}/api/workloads/{}/logs?lines={}",
            address, remote_id, lines
        );

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;

        if !response.status().is_success() {
            return Err(Self::unreachable(
                node,
                format!("log fetch rejected with status {}", response.status()),
            ));
        }

        response
            .json::<LogsResponse>()
            .await
            .map(|body| body.logs)
            .map_err(|e| Self::unreachable(node, format!("invalid log response: {}", e)))
    }

    /// Forward a stop request for a delegated workload, best-effort
    pub async fn stop(
        &self,
        node: &NodeId,
        address: &str,
        remote_id: WorkloadId,
    ) -> Result<(), ScheduleError> {
        let url = format!("http://{}/api/workloads/{}/stop", address, remote_id);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::unreachable(node, e))?;

        if !response.status().is_success() {
            return Err(Self::unreachable(
                node,
                format!("stop rejected with status {}", response.status()),
            ));
        }
        Ok(())
    }
}
