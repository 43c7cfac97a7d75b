//! HTTP API: a thin request/response adapter over the core
//!
//! Consumed by the CLI, parent/child/peer nodes and the UI. Handlers
//! translate between wire payloads and the manager/registry and map
//! `AgentError` onto HTTP statuses; no business logic lives here.

use crate::manager::WorkloadManager;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use workmesh_federation::wire::{
    HeartbeatRequest, RegistrationRequest, RegistrationResponse, UnregisterRequest,
};
use workmesh_registry::{NodeResources, NodeType, ResourceRegistry};
use workmesh_shared::{AgentError, Timestamp, Workload, WorkloadId, WorkloadSpec};

/// Shared state behind every handler
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<WorkloadManager>,
    pub registry: Arc<ResourceRegistry>,
    pub started_at: Timestamp,
}

/// Error envelope returned for every failure
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    category: &'static str,
}

struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.0.to_string(),
            category: self.0.category(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the agent's API router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/info", get(info))
        .route("/api/resources", get(resources))
        .route("/api/nodes", get(nodes))
        .route("/api/workloads", post(submit_workload).get(list_workloads))
        .route("/api/workloads/:id", get(get_workload).delete(delete_workload))
        .route("/api/workloads/:id/stop", post(stop_workload))
        .route("/api/workloads/:id/logs", get(workload_logs))
        .route("/api/register", post(register_child))
        .route("/api/heartbeat", post(heartbeat))
        .route("/api/unregister", post(unregister_child))
        .route("/api/peer/register", post(register_peer))
        .route("/api/peer/unregister", post(unregister_peer))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "ts": Timestamp::now().to_rfc3339(),
    }))
}

async fn info(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let own = state.registry.own_resources();
    Json(serde_json::json!({
        "node_id": own.node_id,
        "address": own.address,
        "version": workmesh_shared::VERSION,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

async fn resources(State(state): State<ApiState>) -> Json<NodeResources> {
    Json(state.registry.own_resources())
}

#[derive(Debug, Serialize)]
struct NodesResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<NodeResources>,
    children: Vec<NodeResources>,
    peers: Vec<NodeResources>,
}

async fn nodes(State(state): State<ApiState>) -> Json<NodesResponse> {
    let snapshot = state.registry.snapshot();
    Json(NodesResponse {
        parent: snapshot.parent().cloned(),
        children: snapshot.children().cloned().collect(),
        peers: snapshot.peers().cloned().collect(),
    })
}

async fn submit_workload(
    State(state): State<ApiState>,
    Json(spec): Json<WorkloadSpec>,
) -> ApiResult<(StatusCode, Json<Workload>)> {
    let record = state.manager.submit(spec).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Serialize)]
struct WorkloadsResponse {
    workloads: Vec<Workload>,
}

async fn list_workloads(State(state): State<ApiState>) -> Json<WorkloadsResponse> {
    Json(WorkloadsResponse {
        workloads: state.manager.list().await,
    })
}

async fn get_workload(
    State(state): State<ApiState>,
    Path(id): Path<WorkloadId>,
) -> ApiResult<Json<Workload>> {
    Ok(Json(state.manager.get(id).await?))
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

async fn stop_workload(
    State(state): State<ApiState>,
    Path(id): Path<WorkloadId>,
) -> ApiResult<Json<MessageResponse>> {
    let record = state.manager.stop(id).await?;
    Ok(Json(MessageResponse {
        message: format!("workload {} is {}", record.id, record.status),
    }))
}

async fn delete_workload(
    State(state): State<ApiState>,
    Path(id): Path<WorkloadId>,
) -> ApiResult<Json<MessageResponse>> {
    state.manager.delete(id).await?;
    Ok(Json(MessageResponse {
        message: format!("workload {} deleted", id),
    }))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    lines: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    logs: Vec<String>,
}

async fn workload_logs(
    State(state): State<ApiState>,
    Path(id): Path<WorkloadId>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let lines = query.lines.unwrap_or(100);
    Ok(Json(LogsResponse {
        logs: state.manager.logs(id, lines).await?,
    }))
}

async fn register_child(
    State(state): State<ApiState>,
    Json(request): Json<RegistrationRequest>,
) -> Json<RegistrationResponse> {
    let mut observed = request.resources;
    // the payload's address is authoritative, never the TCP peer
    observed.node_id = request.node_id;
    state.registry.update_remote(NodeType::Child, observed);

    Json(RegistrationResponse {
        parent_node: state.registry.own_resources(),
    })
}

async fn heartbeat(
    State(state): State<ApiState>,
    Json(request): Json<HeartbeatRequest>,
) -> Json<serde_json::Value> {
    let mut observed = request.resources;
    observed.node_id = request.node_id;
    state.registry.update_remote(NodeType::Child, observed);
    Json(serde_json::json!({}))
}

async fn unregister_child(
    State(state): State<ApiState>,
    Json(request): Json<UnregisterRequest>,
) -> Json<serde_json::Value> {
    state.registry.remove_remote(&request.node_id);
    Json(serde_json::json!({}))
}

async fn register_peer(
    State(state): State<ApiState>,
    Json(request): Json<RegistrationRequest>,
) -> Json<serde_json::Value> {
    let mut observed = request.resources;
    observed.node_id = request.node_id;
    state.registry.update_remote(NodeType::Peer, observed);
    Json(serde_json::json!({}))
}

async fn unregister_peer(
    State(state): State<ApiState>,
    Json(request): Json<UnregisterRequest>,
) -> Json<serde_json::Value> {
    state.registry.remove_remote(&request.node_id);
    Json(serde_json::json!({}))
}
