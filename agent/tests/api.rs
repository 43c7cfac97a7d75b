//! End-to-end API tests against an in-process agent

use serde_json::{json, Value};
use std::time::Duration;
use workmesh_agent::{Agent, AgentConfig};

const GIB: u64 = 1 << 30;

fn test_config(cpu: f64, memory: u64, log_dir: &std::path::Path) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.node.id = format!("test-{:08x}", rand::random::<u32>());
    config.node.listen_address = "127.0.0.1".to_string();
    config.node.listen_port = 0;
    config.resources.cpu = cpu;
    config.resources.memory = memory;
    config.resources.storage = 100 * GIB;
    config.executor.log_dir = log_dir.to_string_lossy().into_owned();
    config.executor.stop_timeout_secs = 2;
    config
}

async fn start_agent(cpu: f64, memory: u64, log_dir: &std::path::Path) -> Agent {
    Agent::start(test_config(cpu, memory, log_dir))
        .await
        .expect("agent starts")
}

fn url(agent: &Agent, path: &str) -> String {
    format!("http://{}{}", agent.local_addr(), path)
}

#[tokio::test]
async fn test_health_info_and_resources() {
    let dir = tempfile::tempdir().unwrap();
    let agent = start_agent(4.0, 8 * GIB, dir.path()).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(url(&agent, "/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["ts"].is_string());

    let info: Value = client
        .get(url(&agent, "/api/info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(info["node_id"].as_str().unwrap().starts_with("test-"));

    let resources: Value = client
        .get(url(&agent, "/api/resources"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resources["total"]["cpu"], 4.0);
    assert_eq!(resources["used"]["cpu"], 0.0);
    assert_eq!(resources["status"], "active");

    agent.stop().await;
}

#[tokio::test]
async fn test_submit_inspect_stop_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let agent = start_agent(4.0, 8 * GIB, dir.path()).await;
    let client = reqwest::Client::new();

    let submission = json!({
        "name": "sleeper",
        "type": "process",
        "requirements": {"cpu": 1.0, "memory": 512 * 1024 * 1024},
        "config": {"command": "sleep", "args": ["60"]}
    });

    let response = client
        .post(url(&agent, "/api/workloads"))
        .json(&submission)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let record: Value = response.json().await.unwrap();
    assert_eq!(record["status"], "running");
    assert_eq!(record["placement"]["mode"], "local");
    assert!(record["process_pid"].as_u64().is_some());
    let id = record["id"].as_str().unwrap().to_string();

    // the ledger reflects the running workload
    let resources: Value = client
        .get(url(&agent, "/api/resources"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resources["used"]["cpu"], 1.0);

    // inspection returns the same spec fields
    let fetched: Value = client
        .get(url(&agent, &format!("/api/workloads/{}", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["name"], submission["name"]);
    assert_eq!(fetched["type"], submission["type"]);
    assert_eq!(fetched["requirements"]["cpu"], 1.0);
    assert_eq!(fetched["config"], submission["config"]);

    let listed: Value = client
        .get(url(&agent, "/api/workloads"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["workloads"].as_array().unwrap().len(), 1);

    // stop is effective and idempotent
    let stop = client
        .post(url(&agent, &format!("/api/workloads/{}/stop", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(stop.status(), 200);

    let stopped: Value = client
        .get(url(&agent, &format!("/api/workloads/{}", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stopped["status"], "stopped");
    assert!(stopped["exit_code"].is_i64() || stopped["exit_code"].is_u64());

    let resources: Value = client
        .get(url(&agent, "/api/resources"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resources["used"]["cpu"], 0.0);

    let second_stop = client
        .post(url(&agent, &format!("/api/workloads/{}/stop", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(second_stop.status(), 200);

    let delete = client
        .delete(url(&agent, &format!("/api/workloads/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), 200);

    let gone = client
        .get(url(&agent, &format!("/api/workloads/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), 404);

    agent.stop().await;
}

#[tokio::test]
async fn test_delete_of_running_workload_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let agent = start_agent(4.0, 8 * GIB, dir.path()).await;
    let client = reqwest::Client::new();

    let record: Value = client
        .post(url(&agent, "/api/workloads"))
        .json(&json!({
            "name": "sleeper",
            "type": "process",
            "requirements": {"cpu": 1.0},
            "config": {"command": "sleep", "args": ["60"]}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = record["id"].as_str().unwrap().to_string();

    let delete = client
        .delete(url(&agent, &format!("/api/workloads/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), 409);

    agent.stop().await;
}

#[tokio::test]
async fn test_exact_fit_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let agent = start_agent(2.0, 2 * GIB, dir.path()).await;
    let client = reqwest::Client::new();

    // requirements exactly equal to availability schedule locally
    let exact: Value = client
        .post(url(&agent, "/api/workloads"))
        .json(&json!({
            "name": "exact-fit",
            "type": "process",
            "requirements": {"cpu": 2.0, "memory": 2 * GIB, "storage": 100 * GIB},
            "config": {"command": "sleep", "args": ["60"]}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(exact["status"], "running");

    // with no eligible remote, anything more is 503
    let over = client
        .post(url(&agent, "/api/workloads"))
        .json(&json!({
            "name": "one-byte-too-much",
            "type": "process",
            "requirements": {"memory": 1},
            "config": {"command": "sleep", "args": ["1"]}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(over.status(), 503);

    agent.stop().await;
}

#[tokio::test]
async fn test_invalid_submissions_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let agent = start_agent(4.0, 8 * GIB, dir.path()).await;
    let client = reqwest::Client::new();

    // empty name
    let response = client
        .post(url(&agent, "/api/workloads"))
        .json(&json!({"name": "  ", "type": "process", "config": {"command": "true"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // unknown kind fails deserialization
    let response = client
        .post(url(&agent, "/api/workloads"))
        .json(&json!({"name": "x", "type": "teleport"}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());

    // unknown ids are 404
    let response = client
        .get(url(
            &agent,
            "/api/workloads/00000000-0000-4000-8000-000000000000",
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    agent.stop().await;
}

#[tokio::test]
async fn test_logs_tail() {
    let dir = tempfile::tempdir().unwrap();
    let agent = start_agent(4.0, 8 * GIB, dir.path()).await;
    let client = reqwest::Client::new();

    let record: Value = client
        .post(url(&agent, "/api/workloads"))
        .json(&json!({
            "name": "chatty",
            "type": "process",
            "requirements": {"cpu": 0.1},
            "config": {"command": "sh", "args": ["-c", "for i in 1 2 3 4 5; do echo line-$i; done"]}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = record["id"].as_str().unwrap().to_string();

    // give the child a moment to run and flush
    tokio::time::sleep(Duration::from_millis(500)).await;

    let logs: Value = client
        .get(url(&agent, &format!("/api/workloads/{}/logs?lines=2", id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let lines = logs["logs"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "line-4");
    assert_eq!(lines[1], "line-5");

    agent.stop().await;
}

#[tokio::test]
async fn test_child_registration_and_unregister() {
    let dir = tempfile::tempdir().unwrap();
    let agent = start_agent(4.0, 8 * GIB, dir.path()).await;
    let client = reqwest::Client::new();

    let child = json!({
        "node_id": "edge-child",
        "resources": {
            "node_id": "edge-child",
            "node_type": "self",
            "address": "10.1.2.3:8900",
            "total": {"cpu": 8.0, "gpu": 0, "memory": 16 * GIB, "storage": 100 * GIB},
            "used": {"cpu": 0.0, "gpu": 0, "memory": 0, "storage": 0},
            "available": {"cpu": 8.0, "gpu": 0, "memory": 16 * GIB, "storage": 100 * GIB},
            "status": "active",
            "last_seen": 0u64,
            "metadata": {}
        }
    });

    let response: Value = client
        .post(url(&agent, "/api/register"))
        .json(&child)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(response["parent_node"]["node_id"]
        .as_str()
        .unwrap()
        .starts_with("test-"));

    let nodes: Value = client
        .get(url(&agent, "/api/nodes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let children = nodes["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["node_id"], "edge-child");
    assert_eq!(children[0]["address"], "10.1.2.3:8900");

    client
        .post(url(&agent, "/api/unregister"))
        .json(&json!({"node_id": "edge-child"}))
        .send()
        .await
        .unwrap();

    let nodes: Value = client
        .get(url(&agent, "/api/nodes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(nodes["children"].as_array().unwrap().is_empty());

    agent.stop().await;
}

#[tokio::test]
async fn test_service_readiness_timeout_releases_resources() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(4.0, 8 * GIB, dir.path());
    config.executor.startup_timeout_secs = 1;
    config.executor.readiness_poll_ms = 50;
    let agent = Agent::start(config).await.unwrap();
    let client = reqwest::Client::new();

    // the fake inference binary never opens its port
    let response = client
        .post(url(&agent, "/api/workloads"))
        .json(&json!({
            "name": "detector",
            "type": "mlmodel",
            "requirements": {"cpu": 1.0},
            "config": {
                "model_type": "yolo",
                "model_path": "/models/fake.onnx",
                "service_port": 39,
                "command": "sleep 60"
            }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    // the failed record is retained and the reservation was returned
    let listed: Value = client
        .get(url(&agent, "/api/workloads"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["workloads"][0]["status"], "failed");

    let resources: Value = client
        .get(url(&agent, "/api/resources"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resources["used"]["cpu"], 0.0);

    agent.stop().await;
}
