// ===================================================================================================
// MeshManager — lifecycle owner
// ===================================================================================================
//
// Drives heartbeat/sweep timers, services inbound membership and task messages, enforces
// nonce replay protection on inbound task requests, and mediates outbound delegation.
// ===================================================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SwarmConfig;
use crate::discovery::{PeerDiscovery, PeerDiscoveryConfig};
use crate::identity::NodeIdentity;
use crate::logging;
use crate::messages::{
    GossipMessage, GossipPeer, HeartbeatMessage, LeaveRequest, SwarmTaskRequest, SwarmTaskResult,
    TaskRequestDecision,
};
use crate::peer::{PeerEntry, PeerStatus, PeerTable, SweepReport};
use crate::session::SessionFactory;
use crate::transport::PeerTransport;

/// Injected sink for `POST /task/result` callbacks — in production this is the
/// `WorkDistributor` resolving its matching `ActiveDelegation`.
#[async_trait]
pub trait TaskResultSink: Send + Sync {
    /// Returns `true` if `result.task_id` matched a pending delegation.
    async fn resolve_task(&self, result: SwarmTaskResult) -> bool;
}

#[derive(Debug, Clone)]
pub enum SwarmEvent {
    PeerJoined(String),
    PeerLeft(String),
    PeerDiscovered(String),
    SweepCompleted(SweepReport),
}

/// Outcome of `delegate_task`. `task_id` is only populated once a request was
/// actually composed and sent (i.e. the target peer was active).
#[derive(Debug, Clone)]
pub struct DelegationOutcome {
    pub accepted: bool,
    pub reason: Option<String>,
    pub task_id: Option<String>,
}

struct NonceLedger {
    seen: HashMap<String, DateTime<Utc>>,
}

impl NonceLedger {
    fn new() -> Self {
        Self {
            seen: HashMap::new(),
        }
    }

    fn expire(&mut self, window_ms: u64) {
        let now = Utc::now();
        self.seen
            .retain(|_, first_seen_at| (now - *first_seen_at).num_milliseconds() < window_ms as i64);
    }

    fn is_replay(&self, nonce: &str) -> bool {
        self.seen.contains_key(nonce)
    }

    fn record(&mut self, nonce: String) {
        self.seen.insert(nonce, Utc::now());
    }

    fn clear(&mut self) {
        self.seen.clear();
    }
}

struct Timers {
    heartbeat: JoinHandle<()>,
    sweep: JoinHandle<()>,
}

pub struct MeshManager {
    config: SwarmConfig,
    local_identity: NodeIdentity,
    peer_table: PeerTable,
    discovery: PeerDiscovery,
    transport: PeerTransport,
    nonce_ledger: RwLock<NonceLedger>,
    session_factory: Option<Arc<dyn SessionFactory>>,
    task_result_sink: RwLock<Option<Arc<dyn TaskResultSink>>>,
    active_sessions: AtomicU32,
    load: RwLock<f64>,
    events: broadcast::Sender<SwarmEvent>,
    running: AtomicBool,
    timers: Mutex<Option<Timers>>,
}

impl MeshManager {
    pub fn new(
        config: SwarmConfig,
        local_identity: NodeIdentity,
        session_factory: Option<Arc<dyn SessionFactory>>,
    ) -> Arc<Self> {
        let peer_table = PeerTable::new(config.max_peers);
        let transport = PeerTransport::new(config.token.clone());
        let (events_tx, _) = broadcast::channel(256);

        let discovery_peer_table = peer_table.clone();
        let discovery_events = events_tx.clone();
        let callback_peer_table = discovery_peer_table.clone();
        let discovery = PeerDiscovery::new(
            PeerDiscoveryConfig {
                mdns: config.mdns,
                seeds: config.seeds.clone(),
                gossip: config.gossip,
            },
            local_identity.clone(),
            transport.clone(),
            Arc::new(move |identity: NodeIdentity| {
                let peer_table = callback_peer_table.clone();
                let events = discovery_events.clone();
                let node_id = identity.node_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = peer_table.add(identity).await {
                        warn!(node_id = %node_id, error = %e, "failed to add discovered peer");
                        return;
                    }
                    let _ = events.send(SwarmEvent::PeerDiscovered(node_id));
                });
            }),
        );

        Arc::new(Self {
            config,
            local_identity,
            peer_table,
            discovery,
            transport,
            nonce_ledger: RwLock::new(NonceLedger::new()),
            session_factory,
            task_result_sink: RwLock::new(None),
            active_sessions: AtomicU32::new(0),
            load: RwLock::new(0.0),
            events: events_tx,
            running: AtomicBool::new(false),
            timers: Mutex::new(None),
        })
    }

    pub fn local_identity(&self) -> &NodeIdentity {
        &self.local_identity
    }

    pub fn peer_table(&self) -> &PeerTable {
        &self.peer_table
    }

    pub fn transport(&self) -> &PeerTransport {
        &self.transport
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SwarmEvent> {
        self.events.subscribe()
    }

    pub async fn set_task_result_sink(&self, sink: Arc<dyn TaskResultSink>) {
        *self.task_result_sink.write().await = Some(sink);
    }

    pub fn set_active_sessions(&self, count: u32) {
        self.active_sessions.store(count, Ordering::Relaxed);
    }

    pub async fn set_load(&self, load: f64) {
        *self.load.write().await = load.clamp(0.0, 1.0);
    }

    /// Idempotent: starts discovery, schedules the heartbeat and sweep timers.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        self.discovery.start().await;

        let heartbeat = {
            let mesh = self.clone();
            tokio::spawn(async move { mesh.run_heartbeat_loop().await })
        };
        let sweep = {
            let mesh = self.clone();
            tokio::spawn(async move { mesh.run_sweep_loop().await })
        };

        *self.timers.lock().await = Some(Timers { heartbeat, sweep });
        info!(node_id = %self.local_identity.node_id, "mesh manager started");
    }

    /// Idempotent: cancels both timers, broadcasts Leave to active peers
    /// (swallowing failures), stops discovery, and clears the nonce ledger.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(timers) = self.timers.lock().await.take() {
            timers.heartbeat.abort();
            timers.sweep.abort();
        }

        let active = self.peer_table.get_active().await;
        for peer in active {
            let msg = LeaveRequest {
                node_id: self.local_identity.node_id.clone(),
                reason: Some("shutdown".to_string()),
            };
            let resp = self.transport.send_leave(&peer.identity.api_url, msg).await;
            if !resp.success {
                debug!(peer = %peer.identity.node_id, "leave notification failed, ignoring");
            }
        }

        self.discovery.stop().await;
        self.nonce_ledger.write().await.clear();
        info!(node_id = %self.local_identity.node_id, "mesh manager stopped");
    }

    async fn run_heartbeat_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval());
        loop {
            ticker.tick().await;
            self.broadcast_heartbeat().await;
        }
    }

    async fn broadcast_heartbeat(&self) {
        let msg = HeartbeatMessage {
            node_id: self.local_identity.node_id.clone(),
            timestamp: Utc::now(),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            load: *self.load.read().await,
        };

        for peer in self.peer_table.get_active().await {
            let resp = self
                .transport
                .send_heartbeat(&peer.identity.api_url, &msg)
                .await;
            if !resp.success {
                self.peer_table.record_failure(&peer.identity.node_id).await;
            }
        }
    }

    async fn run_sweep_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        loop {
            ticker.tick().await;
            let report = self.peer_table.sweep(self.config.thresholds()).await;
            if !report.suspected.is_empty()
                || !report.unreachable.is_empty()
                || !report.evicted.is_empty()
            {
                logging::log_mesh_event(
                    "sweep_completed",
                    &format!(
                        "suspected={} unreachable={} evicted={}",
                        report.suspected.len(),
                        report.unreachable.len(),
                        report.evicted.len()
                    ),
                );
                let _ = self.events.send(SwarmEvent::SweepCompleted(report));
            }
        }
    }

    // ===== Inbound handlers =====

    pub async fn handle_join(&self, identity: NodeIdentity) -> crate::error::SwarmResult<PeerEntry> {
        let node_id = identity.node_id.clone();
        match self.peer_table.add(identity).await {
            Ok(entry) => {
                logging::log_mesh_event("peer_joined", &node_id);
                let _ = self.events.send(SwarmEvent::PeerJoined(node_id));
                Ok(entry)
            }
            Err(e) => {
                logging::log_error_with_context("peer join rejected", &e);
                Err(e)
            }
        }
    }

    pub async fn handle_leave(&self, node_id: &str) -> bool {
        let result = self.peer_table.mark_left(node_id).await;
        if result {
            logging::log_mesh_event("peer_left", node_id);
            let _ = self.events.send(SwarmEvent::PeerLeft(node_id.to_string()));
        }
        result
    }

    pub async fn handle_heartbeat(&self, msg: HeartbeatMessage, _observed_latency_ms: u64) -> bool {
        self.peer_table
            .record_heartbeat(&msg.node_id, _observed_latency_ms)
            .await
    }

    pub async fn handle_gossip(&self, msg: GossipMessage) -> GossipMessage {
        self.discovery.process_gossip(msg.peers).await;

        let mut peers: Vec<GossipPeer> = self
            .peer_table
            .get_active()
            .await
            .into_iter()
            .filter(|entry| entry.identity.node_id != msg.sender_node_id)
            .map(|entry| GossipPeer {
                node_id: entry.identity.node_id,
                api_url: entry.identity.api_url,
                status: entry.status,
            })
            .collect();

        peers.push(GossipPeer {
            node_id: self.local_identity.node_id.clone(),
            api_url: self.local_identity.api_url.clone(),
            status: PeerStatus::Active,
        });

        GossipMessage {
            sender_node_id: self.local_identity.node_id.clone(),
            peers,
        }
    }

    pub async fn handle_task_request(&self, req: SwarmTaskRequest) -> TaskRequestDecision {
        {
            let mut ledger = self.nonce_ledger.write().await;
            ledger.expire(self.config.nonce_window_ms);
            if ledger.is_replay(&req.nonce) {
                return TaskRequestDecision::rejected("Replayed nonce");
            }
        }

        let Some(factory) = &self.session_factory else {
            return TaskRequestDecision::rejected("Node does not accept delegated tasks");
        };

        self.nonce_ledger.write().await.record(req.nonce.clone());
        factory.on_task_request(req).await
    }

    pub async fn handle_task_result(&self, result: SwarmTaskResult) -> bool {
        match self.task_result_sink.read().await.as_ref() {
            Some(sink) => sink.resolve_task(result).await,
            None => {
                debug!(task_id = %result.task_id, "no task result sink registered, dropping");
                false
            }
        }
    }

    // ===== Outbound delegation =====

    pub async fn delegate_task(
        &self,
        peer_node_id: &str,
        task_text: String,
        originator_session_id: String,
        constraints: Option<crate::messages::TaskConstraints>,
    ) -> DelegationOutcome {
        let Some(peer) = self.peer_table.get(peer_node_id).await else {
            return DelegationOutcome {
                accepted: false,
                reason: Some("peer not active".to_string()),
                task_id: None,
            };
        };
        if peer.status != PeerStatus::Active {
            return DelegationOutcome {
                accepted: false,
                reason: Some("peer not active".to_string()),
                task_id: None,
            };
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        let req = SwarmTaskRequest {
            task_id: task_id.clone(),
            originator_node_id: self.local_identity.node_id.clone(),
            originator_session_id,
            task_text,
            constraints,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            nonce: uuid::Uuid::new_v4().to_string(),
        };

        let resp = self
            .transport
            .send_task_request(&peer.identity.api_url, &req)
            .await;

        if !resp.success {
            let reason = resp.error.unwrap_or_else(|| "transport failure".to_string());
            logging::log_delegation(&task_id, peer_node_id, &reason);
            return DelegationOutcome {
                accepted: false,
                reason: Some(reason),
                task_id: Some(task_id),
            };
        }

        let decision = resp.body.unwrap_or_else(|| {
            TaskRequestDecision::rejected("peer returned no decision")
        });

        logging::log_delegation(
            &task_id,
            peer_node_id,
            if decision.accepted { "accepted" } else { "rejected" },
        );

        DelegationOutcome {
            accepted: decision.accepted,
            reason: decision.reason,
            task_id: Some(task_id),
        }
    }
}
