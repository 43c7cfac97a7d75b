//! Two-node federation scenarios on ephemeral ports

use serde_json::{json, Value};
use std::time::Duration;
use workmesh_agent::{Agent, AgentConfig};

const GIB: u64 = 1 << 30;

fn base_config(id: &str, cpu: f64, log_dir: &std::path::Path) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.node.id = id.to_string();
    config.node.listen_address = "127.0.0.1".to_string();
    config.node.listen_port = 0;
    config.resources.cpu = cpu;
    config.resources.memory = 16 * GIB;
    config.resources.storage = 100 * GIB;
    config.executor.log_dir = log_dir.to_string_lossy().into_owned();
    config.executor.stop_timeout_secs = 2;
    config
}

async fn get_json(client: &reqwest::Client, url: String) -> Value {
    client.get(url).send().await.unwrap().json().await.unwrap()
}

/// Poll until the predicate holds or the deadline passes
async fn wait_for<F>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = bool>>>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_child_registration_delegation_and_view_convergence() {
    let parent_dir = tempfile::tempdir().unwrap();
    let child_dir = tempfile::tempdir().unwrap();

    // a parent too small to run anything itself
    let parent = Agent::start(base_config("fed-parent", 0.5, parent_dir.path()))
        .await
        .unwrap();

    // a child that registers with the parent and heartbeats on triggers
    let mut child_config = base_config("fed-child", 8.0, child_dir.path());
    child_config.parent.enabled = true;
    child_config.parent.address = parent.local_addr().to_string();
    let child = Agent::start(child_config).await.unwrap();

    let client = reqwest::Client::new();
    let parent_nodes_url = format!("http://{}/api/nodes", parent.local_addr());

    // registration lands on the parent
    let registered = wait_for(Duration::from_secs(5), || {
        let client = client.clone();
        let url = parent_nodes_url.clone();
        Box::pin(async move {
            let nodes: Value = get_json(&client, url).await;
            nodes["children"]
                .as_array()
                .map(|c| c.iter().any(|n| n["node_id"] == "fed-child"))
                .unwrap_or(false)
        })
    })
    .await;
    assert!(registered, "child never registered with parent");

    // a submission the parent cannot fit is delegated to the child
    let record: Value = client
        .post(format!("http://{}/api/workloads", parent.local_addr()))
        .json(&json!({
            "name": "delegated-sleeper",
            "type": "process",
            "requirements": {"cpu": 2.0, "memory": 2 * GIB},
            "config": {"command": "sleep", "args": ["60"]}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(record["placement"]["mode"], "delegated");
    assert_eq!(record["placement"]["node"], "fed-child");
    assert_eq!(record["status"], "running");
    let parent_side_id = record["id"].as_str().unwrap().to_string();
    let remote_id = record["placement"]["remote_id"].as_str().unwrap().to_string();

    // the child really runs it
    let child_view: Value = get_json(
        &client,
        format!("http://{}/api/workloads/{}", child.local_addr(), remote_id),
    )
    .await;
    assert_eq!(child_view["status"], "running");
    assert_eq!(child_view["placement"]["mode"], "local");

    // the parent does not account delegated work against its own ledger
    let parent_resources: Value = get_json(
        &client,
        format!("http://{}/api/resources", parent.local_addr()),
    )
    .await;
    assert_eq!(parent_resources["used"]["cpu"], 0.0);

    // the triggered heartbeat pushes the child's allocation into the
    // parent's view well inside the 2 s latency target
    let converged = wait_for(Duration::from_secs(3), || {
        let client = client.clone();
        let url = parent_nodes_url.clone();
        Box::pin(async move {
            let nodes: Value = get_json(&client, url).await;
            nodes["children"]
                .as_array()
                .map(|c| {
                    c.iter()
                        .any(|n| n["node_id"] == "fed-child" && n["used"]["cpu"] == 2.0)
                })
                .unwrap_or(false)
        })
    })
    .await;
    assert!(converged, "parent never observed the child's allocation");

    // stop through the parent propagates to the child
    let stop = client
        .post(format!(
            "http://{}/api/workloads/{}/stop",
            parent.local_addr(),
            parent_side_id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(stop.status(), 200);

    let child_stopped = wait_for(Duration::from_secs(5), || {
        let client = client.clone();
        let url = format!("http://{}/api/workloads/{}", child.local_addr(), remote_id);
        Box::pin(async move {
            let view: Value = get_json(&client, url).await;
            view["status"] == "stopped"
        })
    })
    .await;
    assert!(child_stopped, "stop never reached the child");

    let parent_view: Value = get_json(
        &client,
        format!(
            "http://{}/api/workloads/{}",
            parent.local_addr(),
            parent_side_id
        ),
    )
    .await;
    assert_eq!(parent_view["status"], "stopped");

    child.stop().await;
    parent.stop().await;
}

#[tokio::test]
async fn test_delegated_terminal_status_is_mirrored_on_inspection() {
    let parent_dir = tempfile::tempdir().unwrap();
    let child_dir = tempfile::tempdir().unwrap();

    let parent = Agent::start(base_config("mirror-parent", 0.5, parent_dir.path()))
        .await
        .unwrap();
    let mut child_config = base_config("mirror-child", 8.0, child_dir.path());
    child_config.parent.enabled = true;
    child_config.parent.address = parent.local_addr().to_string();
    let child = Agent::start(child_config).await.unwrap();

    let client = reqwest::Client::new();
    let parent_nodes_url = format!("http://{}/api/nodes", parent.local_addr());

    let registered = wait_for(Duration::from_secs(5), || {
        let client = client.clone();
        let url = parent_nodes_url.clone();
        Box::pin(async move {
            let nodes: Value = get_json(&client, url).await;
            !nodes["children"].as_array().unwrap_or(&Vec::new()).is_empty()
        })
    })
    .await;
    assert!(registered);

    // a short-lived delegated workload that completes on the child
    let record: Value = client
        .post(format!("http://{}/api/workloads", parent.local_addr()))
        .json(&json!({
            "name": "quick-job",
            "type": "process",
            "requirements": {"cpu": 1.0},
            "config": {"command": "sh", "args": ["-c", "exit 0"]}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["placement"]["mode"], "delegated");
    let id = record["id"].as_str().unwrap().to_string();

    // inspecting the parent's stub polls the remote and mirrors the
    // terminal status
    let mirrored = wait_for(Duration::from_secs(5), || {
        let client = client.clone();
        let url = format!("http://{}/api/workloads/{}", parent.local_addr(), id);
        Box::pin(async move {
            let view: Value = get_json(&client, url).await;
            view["status"] == "completed" && view["exit_code"] == 0
        })
    })
    .await;
    assert!(mirrored, "terminal status never mirrored to the parent");

    child.stop().await;
    parent.stop().await;
}

#[tokio::test]
async fn test_peer_poll_feeds_the_ledger() {
    let a_dir = tempfile::tempdir().unwrap();
    let b_dir = tempfile::tempdir().unwrap();

    let node_a = Agent::start(base_config("peer-a", 4.0, a_dir.path()))
        .await
        .unwrap();

    let mut b_config = base_config("peer-b", 4.0, b_dir.path());
    b_config.peers.enabled = true;
    b_config.peers.addresses = vec![node_a.local_addr().to_string()];
    b_config.heartbeat_interval_secs = 1;
    let node_b = Agent::start(b_config).await.unwrap();

    let client = reqwest::Client::new();

    // node B polls A and files it as a peer
    let discovered = wait_for(Duration::from_secs(5), || {
        let client = client.clone();
        let url = format!("http://{}/api/nodes", node_b.local_addr());
        Box::pin(async move {
            let nodes: Value = get_json(&client, url).await;
            nodes["peers"]
                .as_array()
                .map(|p| p.iter().any(|n| n["node_id"] == "peer-a"))
                .unwrap_or(false)
        })
    })
    .await;
    assert!(discovered, "node B never discovered node A");

    // node B announced itself to A on startup
    let announced = wait_for(Duration::from_secs(5), || {
        let client = client.clone();
        let url = format!("http://{}/api/nodes", node_a.local_addr());
        Box::pin(async move {
            let nodes: Value = get_json(&client, url).await;
            nodes["peers"]
                .as_array()
                .map(|p| p.iter().any(|n| n["node_id"] == "peer-b"))
                .unwrap_or(false)
        })
    })
    .await;
    assert!(announced, "node B never announced itself to node A");

    node_b.stop().await;
    node_a.stop().await;
}
