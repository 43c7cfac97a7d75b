//! Workmesh Scheduler - placement decisions and delegation
//!
//! Translates a workload submission into an execution decision: run it
//! locally when the registry grants the allocation, otherwise pick an
//! active child or peer whose observed resources fit and forward the
//! submission there over HTTP.

pub mod delegate;
pub mod error;
pub mod strategy;

pub use delegate::DelegationClient;
pub use error::{Result, ScheduleError};
pub use strategy::{BestFitStrategy, LargestCpuStrategy, PlacementStrategy, StrategyKind};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use workmesh_registry::{AllocationHandle, NodeResources, ResourceRegistry};
use workmesh_executor::{ExecutorSet, StartedWorkload};
use workmesh_shared::{NodeId, Workload, WorkloadKind};

/// Outcome of a placement decision that has been carried out
#[derive(Debug)]
pub enum PlacementOutcome {
    /// Resources were allocated and the executor reports the workload
    /// running; the handle releases the allocation when it ends
    Local {
        handle: AllocationHandle,
        started: StartedWorkload,
    },
    /// The workload was accepted by a remote node
    Delegated {
        node: NodeId,
        address: String,
        remote: Workload,
    },
}

/// Scheduler over the registry, executor set and delegation client
pub struct Scheduler {
    registry: Arc<ResourceRegistry>,
    executors: Arc<ExecutorSet>,
    strategy: Box<dyn PlacementStrategy>,
    delegation: DelegationClient,
}

impl Scheduler {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        executors: Arc<ExecutorSet>,
        strategy: StrategyKind,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            executors,
            strategy: strategy.build(),
            delegation: DelegationClient::new(request_timeout),
        }
    }

    /// Decide where a pending workload runs and carry the decision out
    pub async fn place(&self, workload: &Workload) -> Result<PlacementOutcome> {
        match self.registry.allocate(workload.requirements) {
            Ok(handle) => match self.execute_local(workload).await {
                Ok(started) => {
                    info!(
                        "workload {} ({}) placed locally",
                        workload.id, workload.kind
                    );
                    Ok(PlacementOutcome::Local { handle, started })
                }
                Err(e) => {
                    // a failed launch must not leak its reservation
                    self.registry.release(handle);
                    Err(e)
                }
            },
            Err(insufficient) => {
                debug!(
                    "workload {} does not fit locally ({}), trying delegation",
                    workload.id, insufficient
                );
                self.delegate(workload).await
            }
        }
    }

    async fn execute_local(&self, workload: &Workload) -> Result<StartedWorkload> {
        match self.executors.for_kind(workload.kind) {
            Some(executor) => Ok(executor.execute(workload).await?),
            // record-only kinds have nothing to launch
            None => Ok(StartedWorkload {
                pid: None,
                endpoint: None,
            }),
        }
    }

    async fn delegate(&self, workload: &Workload) -> Result<PlacementOutcome> {
        if workload.kind == WorkloadKind::Data {
            // record-only workloads are never forwarded
            return Err(ScheduleError::NoCapacity);
        }

        let snapshot = self.registry.snapshot();
        let requirement = &workload.requirements;

        // children are strictly preferred over peers
        let children: Vec<NodeResources> = snapshot
            .children()
            .filter(|n| n.is_active() && requirement.fits(&n.available))
            .cloned()
            .collect();
        let candidates = if children.is_empty() {
            snapshot
                .peers()
                .filter(|n| n.is_active() && requirement.fits(&n.available))
                .cloned()
                .collect()
        } else {
            children
        };

        let Some(target) = self.strategy.select(&candidates, requirement) else {
            return Err(ScheduleError::NoCapacity);
        };

        let remote = self
            .delegation
            .submit(&target.node_id, &target.address, &workload.to_spec())
            .await?;

        info!(
            "workload {} delegated to {} as {} (strategy {})",
            workload.id,
            target.node_id,
            remote.id,
            self.strategy.name()
        );

        Ok(PlacementOutcome::Delegated {
            node: target.node_id.clone(),
            address: target.address.clone(),
            remote,
        })
    }

    /// Client used by the workload manager to follow up on delegations
    pub fn delegation(&self) -> &DelegationClient {
        &self.delegation
    }
}
