//! Multi-node integration tests: each node is a real axum server bound to a loopback
//! port, exercised over real HTTP via reqwest — no mocking of the wire.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use swarm_core::api_server::{self, ApiState};
use swarm_core::config::SwarmConfig;
use swarm_core::distributor::WorkDistributor;
use swarm_core::identity::NodeIdentity;
use swarm_core::mesh::MeshManager;
use swarm_core::messages::{SwarmTaskRequest, SwarmTaskResult, TaskRequestDecision, TaskResultStatus};
use swarm_core::session::{MockSessionFactory, SessionFactory};
use swarm_core::transport::PeerTransport;

/// Accepts every request like `MockSessionFactory`, but also forwards the
/// incoming request to a channel so a test can observe the task_id the
/// originator assigned.
struct CapturingSessionFactory {
    seen: mpsc::UnboundedSender<SwarmTaskRequest>,
}

#[async_trait]
impl SessionFactory for CapturingSessionFactory {
    async fn on_task_request(&self, request: SwarmTaskRequest) -> TaskRequestDecision {
        let _ = self.seen.send(request);
        TaskRequestDecision::accepted(uuid::Uuid::new_v4().to_string())
    }
}

struct RunningNode {
    mesh: Arc<MeshManager>,
    distributor: Arc<WorkDistributor>,
    api_url: String,
    server: tokio::task::JoinHandle<()>,
}

impl RunningNode {
    async fn spawn(node_name: &str, seeds: Vec<String>) -> Self {
        Self::spawn_with_factory(node_name, seeds, Arc::new(MockSessionFactory)).await
    }

    async fn spawn_with_factory(
        node_name: &str,
        seeds: Vec<String>,
        session_factory: Arc<dyn SessionFactory>,
    ) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let api_url = format!("http://{addr}");

        let config = SwarmConfig {
            node_name: node_name.to_string(),
            api_url: api_url.clone(),
            seeds,
            heartbeat_interval_ms: 50,
            sweep_interval_ms: 50,
            nonce_window_ms: 60_000,
            delegation_timeout_ms: 300,
            ..SwarmConfig::default()
        };
        let identity = NodeIdentity::new(node_name, api_url.clone(), vec![], &config.version);
        let mesh = MeshManager::new(config, identity, Some(session_factory));
        let distributor = WorkDistributor::new(mesh.clone(), 0, 300);
        mesh.set_task_result_sink(distributor.clone()).await;
        mesh.start().await;

        let state = ApiState { mesh: mesh.clone(), distributor: distributor.clone(), token: None };
        let router = api_server::build_router(state);
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        // Give the listener a moment to actually accept connections.
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self { mesh, distributor, api_url, server }
    }

    async fn shutdown(self) {
        self.mesh.stop().await;
        self.distributor.cancel_all().await;
        self.server.abort();
    }
}

#[tokio::test]
async fn seed_based_discovery_finds_the_seed_node() {
    let seed = RunningNode::spawn("seed", vec![]).await;
    let joiner = RunningNode::spawn("joiner", vec![seed.api_url.clone()]).await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    let peers = joiner.mesh.peer_table().get_all().await;
    assert!(peers.iter().any(|p| p.identity.node_id == seed.mesh.local_identity().node_id));

    joiner.shutdown().await;
    seed.shutdown().await;
}

#[tokio::test]
async fn replayed_nonce_is_rejected_over_http() {
    let node = RunningNode::spawn("solo", vec![]).await;
    let transport = PeerTransport::new(None);

    let req = swarm_core::messages::SwarmTaskRequest {
        task_id: "t1".to_string(),
        originator_node_id: "origin".to_string(),
        originator_session_id: "sess".to_string(),
        task_text: "do something".to_string(),
        constraints: None,
        correlation_id: "c1".to_string(),
        nonce: "fixed-nonce".to_string(),
    };

    let first = transport.send_task_request(&node.api_url, &req).await;
    assert!(first.success);
    assert!(first.body.unwrap().accepted);

    let mut second = req;
    second.task_id = "t2".to_string();
    let second_resp = transport.send_task_request(&node.api_url, &second).await;
    assert!(second_resp.success);
    let decision = second_resp.body.unwrap();
    assert!(!decision.accepted);
    assert!(decision.reason.unwrap().contains("Replayed"));

    node.shutdown().await;
}

#[tokio::test]
async fn distribute_resolves_against_a_real_peer() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let originator = RunningNode::spawn("originator", vec![]).await;
    let worker =
        RunningNode::spawn_with_factory("worker", vec![], Arc::new(CapturingSessionFactory { seen: seen_tx }))
            .await;

    originator
        .mesh
        .handle_join(worker.mesh.local_identity().clone())
        .await
        .unwrap();

    let originator_distributor = originator.distributor.clone();
    let distribute_handle = tokio::spawn(async move {
        originator_distributor
            .distribute("summarize the repo".to_string(), "cli-session".to_string(), None)
            .await
    });

    let received = tokio::time::timeout(Duration::from_secs(2), seen_rx.recv())
        .await
        .expect("worker should receive the task request before the test timeout")
        .expect("channel should not close before sending");

    let transport = PeerTransport::new(None);
    let result = SwarmTaskResult {
        task_id: received.task_id.clone(),
        peer_node_id: worker.mesh.local_identity().node_id.clone(),
        peer_session_id: "worker-session".to_string(),
        status: TaskResultStatus::Completed,
        findings: json!({ "summary": "done" }),
        tokens_used: 42,
        cost_usd: 0.01,
        duration_ms: 5,
    };
    let post = transport.send_task_result(&originator.api_url, &result).await;
    assert!(post.success);

    let resolved = distribute_handle.await.unwrap().unwrap();
    assert_eq!(resolved.task_id, received.task_id);
    assert_eq!(resolved.tokens_used, 42);

    originator.shutdown().await;
    worker.shutdown().await;
}

#[tokio::test]
async fn distribute_times_out_when_worker_never_posts_a_result() {
    let originator = RunningNode::spawn("originator2", vec![]).await;
    let worker = RunningNode::spawn("worker2", vec![]).await;

    originator
        .mesh
        .handle_join(worker.mesh.local_identity().clone())
        .await
        .unwrap();

    let err = originator
        .distributor
        .distribute("never resolved".to_string(), "cli-session".to_string(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, swarm_core::error::SwarmError::DelegationTimeout(_)));

    originator.shutdown().await;
    worker.shutdown().await;
}

#[tokio::test]
async fn stop_and_cancel_all_leave_nothing_pending() {
    let node = RunningNode::spawn("shutdown-node", vec![]).await;
    let peer = RunningNode::spawn("shutdown-peer", vec![]).await;
    node.mesh.handle_join(peer.mesh.local_identity().clone()).await.unwrap();

    let distributor = node.distributor.clone();
    let handle = tokio::spawn(async move {
        distributor
            .distribute("task that outlives shutdown".to_string(), "sess".to_string(), None)
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    node.distributor.cancel_all().await;
    let err = handle.await.unwrap().unwrap_err();
    assert!(matches!(err, swarm_core::error::SwarmError::Cancelled(_)));
    assert_eq!(node.distributor.pending_count().await, 0);

    node.shutdown().await;
    peer.shutdown().await;
}
