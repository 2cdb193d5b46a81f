// ===================================================================================================
// WorkDistributor — peer selection, delegation, and result correlation
// ===================================================================================================
//
// Turns one `distribute` call into exactly one `SwarmTaskResult` by selecting candidate
// peers, delegating through the mesh manager, and correlating the asynchronous result by
// task_id. Each delegation owns a oneshot channel plus a racing expiry timer; whichever of
// `resolve_task` or the timer gets there first owns removal from the correlation map.
// ===================================================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::{SwarmError, SwarmResult};
use crate::logging;
use crate::mesh::{MeshManager, TaskResultSink};
use crate::messages::{SwarmTaskResult, TaskConstraints};
use crate::peer::PeerEntry;

struct ActiveDelegation {
    peer_node_id: String,
    sent_at: Instant,
    resolver: oneshot::Sender<Result<SwarmTaskResult, SwarmError>>,
    timeout_handle: JoinHandle<()>,
}

pub struct WorkDistributor {
    mesh: Arc<MeshManager>,
    max_retries: u32,
    delegation_timeout_ms: u64,
    round_robin_index: AtomicUsize,
    active_delegations: Arc<Mutex<HashMap<String, ActiveDelegation>>>,
}

impl WorkDistributor {
    pub fn new(mesh: Arc<MeshManager>, max_retries: u32, delegation_timeout_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            mesh,
            max_retries,
            delegation_timeout_ms,
            round_robin_index: AtomicUsize::new(0),
            active_delegations: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub async fn pending_count(&self) -> usize {
        self.active_delegations.lock().await.len()
    }

    async fn select_peers(&self, constraints: Option<&TaskConstraints>) -> Vec<PeerEntry> {
        let active = self.mesh.peer_table().get_active().await;

        let allowlist = constraints
            .map(|c| &c.tool_allowlist)
            .filter(|allowlist| !allowlist.is_empty());

        match allowlist {
            Some(allowlist) => active
                .into_iter()
                .filter(|peer| {
                    peer.identity
                        .capabilities
                        .iter()
                        .any(|cap| allowlist.contains(cap))
                })
                .collect(),
            None => self.round_robin_order(active),
        }
    }

    /// Rotates `active` to start at the internal index, then advances the
    /// index by one so the next call prefers a different starting peer. The
    /// rotation survives across calls (the counter only ever increases).
    fn round_robin_order(&self, mut active: Vec<PeerEntry>) -> Vec<PeerEntry> {
        if active.is_empty() {
            return active;
        }
        let len = active.len();
        let raw = self.round_robin_index.fetch_add(1, Ordering::SeqCst);
        active.rotate_left(raw % len);
        active
    }

    /// Select candidates, delegate through the mesh, and await exactly one
    /// `SwarmTaskResult`, retrying on alternative peers up to `max_retries + 1`
    /// total attempts and enforcing `delegation_timeout_ms` per attempt.
    pub async fn distribute(
        &self,
        task_text: String,
        session_id: String,
        constraints: Option<TaskConstraints>,
    ) -> SwarmResult<SwarmTaskResult> {
        let candidates = self.select_peers(constraints.as_ref()).await;
        if candidates.is_empty() {
            return Err(SwarmError::NoSuitablePeers(
                "no active peers available".to_string(),
            ));
        }

        let attempts = (self.max_retries as usize) + 1;
        let mut last_error =
            SwarmError::NoSuitablePeers("no candidates were attempted".to_string());

        for peer in candidates.into_iter().take(attempts) {
            let outcome = self
                .mesh
                .delegate_task(
                    &peer.identity.node_id,
                    task_text.clone(),
                    session_id.clone(),
                    constraints.clone(),
                )
                .await;

            if !outcome.accepted {
                last_error = SwarmError::UnknownPeer(
                    outcome.reason.unwrap_or_else(|| "delegation rejected".to_string()),
                );
                continue;
            }

            let task_id = match outcome.task_id {
                Some(id) => id,
                None => {
                    last_error = SwarmError::Generic(
                        "peer accepted delegation without a task_id".to_string(),
                    );
                    continue;
                }
            };

            match self.await_result(task_id, peer.identity.node_id.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = e;
                    continue;
                }
            }
        }

        Err(last_error)
    }

    async fn await_result(
        &self,
        task_id: String,
        peer_node_id: String,
    ) -> Result<SwarmTaskResult, SwarmError> {
        let (tx, rx) = oneshot::channel();

        let timeout_handle = {
            let active_delegations = self.active_delegations.clone();
            let timeout_ms = self.delegation_timeout_ms;
            let task_id_for_timer = task_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
                let mut map = active_delegations.lock().await;
                if let Some(delegation) = map.remove(&task_id_for_timer) {
                    logging::log_delegation(&task_id_for_timer, &delegation.peer_node_id, "timed out");
                    let _ = delegation.resolver.send(Err(SwarmError::DelegationTimeout(
                        format!("no result within {timeout_ms}ms"),
                    )));
                }
            })
        };

        self.active_delegations.lock().await.insert(
            task_id.clone(),
            ActiveDelegation {
                peer_node_id,
                sent_at: Instant::now(),
                resolver: tx,
                timeout_handle,
            },
        );

        rx.await
            .unwrap_or(Err(SwarmError::Cancelled("result channel dropped".to_string())))
    }

    /// Cancel every outstanding delegation, aborting its timer and rejecting
    /// its promise with a "cancelled" error. Used on shutdown.
    pub async fn cancel_all(&self) {
        let mut map = self.active_delegations.lock().await;
        for (task_id, delegation) in map.drain() {
            delegation.timeout_handle.abort();
            logging::log_delegation(&task_id, &delegation.peer_node_id, "cancelled");
            let _ = delegation
                .resolver
                .send(Err(SwarmError::Cancelled(format!("delegation {task_id} cancelled"))));
        }
    }
}

#[async_trait]
impl TaskResultSink for WorkDistributor {
    /// Look up `result.task_id`; if present, abort the expiry timer, remove
    /// the entry, and resolve the pending promise. Missing entries (late or
    /// unknown results) are ignored, returning `false`.
    async fn resolve_task(&self, result: SwarmTaskResult) -> bool {
        let mut map = self.active_delegations.lock().await;
        match map.remove(&result.task_id) {
            Some(delegation) => {
                delegation.timeout_handle.abort();
                let elapsed_ms = delegation.sent_at.elapsed().as_millis();
                logging::log_delegation(
                    &result.task_id,
                    &delegation.peer_node_id,
                    &format!("resolved after {elapsed_ms}ms"),
                );
                let _ = delegation.resolver.send(Ok(result));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwarmConfig;
    use crate::identity::NodeIdentity;
    use crate::session::MockSessionFactory;
    use serde_json::json;

    fn identity(node_id: &str, capabilities: Vec<&str>) -> NodeIdentity {
        NodeIdentity::new(
            node_id,
            format!("http://{node_id}"),
            capabilities.into_iter().map(String::from),
            "1.0",
        )
    }

    fn result(task_id: &str) -> SwarmTaskResult {
        SwarmTaskResult {
            task_id: task_id.to_string(),
            peer_node_id: "peer".to_string(),
            peer_session_id: "sess".to_string(),
            status: crate::messages::TaskResultStatus::Completed,
            findings: json!({}),
            tokens_used: 0,
            cost_usd: 0.0,
            duration_ms: 0,
        }
    }

    #[tokio::test]
    async fn distribute_fails_with_no_suitable_peers_when_table_empty() {
        let mesh = MeshManager::new(SwarmConfig::default(), identity("local", vec![]), None);
        let distributor = WorkDistributor::new(mesh, 0, 50);
        let err = distributor
            .distribute("task".to_string(), "sess".to_string(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::NoSuitablePeers(_)));
    }

    #[tokio::test]
    async fn round_robin_rotation_differs_across_calls() {
        let mesh = MeshManager::new(SwarmConfig::default(), identity("local", vec![]), None);
        mesh.peer_table().add(identity("a", vec![])).await.unwrap();
        mesh.peer_table().add(identity("b", vec![])).await.unwrap();
        let distributor = WorkDistributor::new(mesh, 0, 50);

        let first = distributor.select_peers(None).await;
        let second = distributor.select_peers(None).await;
        assert_ne!(
            first[0].identity.node_id, second[0].identity.node_id,
            "successive calls should prefer a different starting peer"
        );
    }

    #[tokio::test]
    async fn capability_match_filters_by_allowlist_overlap() {
        let mesh = MeshManager::new(SwarmConfig::default(), identity("local", vec![]), None);
        mesh.peer_table()
            .add(identity("a", vec!["read-file"]))
            .await
            .unwrap();
        mesh.peer_table().add(identity("b", vec![])).await.unwrap();
        let distributor = WorkDistributor::new(mesh, 0, 50);

        let constraints = TaskConstraints {
            tool_allowlist: vec!["read-file".to_string()],
            ..Default::default()
        };
        let candidates = distributor.select_peers(Some(&constraints)).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identity.node_id, "a");
    }

    // The following tests exercise `await_result`/`resolve_task`/`cancel_all` directly
    // rather than through `distribute`, since `distribute` routes through
    // `MeshManager::delegate_task`, which makes a real HTTP call to the peer's
    // `api_url` — end-to-end delegation scenarios belong in `tests/`, where two
    // real in-process servers are available to talk to each other.

    #[tokio::test]
    async fn await_result_resolves_when_resolve_task_is_called() {
        let mesh = MeshManager::new(SwarmConfig::default(), identity("local", vec![]), None);
        let distributor = WorkDistributor::new(mesh, 0, 5_000);

        let distributor_for_wait = distributor.clone();
        let handle = tokio::spawn(async move {
            distributor_for_wait
                .await_result("task-1".to_string(), "peer-a".to_string())
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(distributor.resolve_task(result("task-1")).await);

        let resolved = handle.await.unwrap().unwrap();
        assert_eq!(resolved.task_id, "task-1");
        assert_eq!(distributor.pending_count().await, 0);
    }

    #[tokio::test]
    async fn await_result_times_out_without_a_result() {
        let mesh = MeshManager::new(SwarmConfig::default(), identity("local", vec![]), None);
        let distributor = WorkDistributor::new(mesh, 0, 30);

        let err = distributor
            .await_result("task-1".to_string(), "peer-a".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::DelegationTimeout(_)));
        assert_eq!(distributor.pending_count().await, 0);
    }

    #[tokio::test]
    async fn late_resolve_after_timeout_is_ignored() {
        let mesh = MeshManager::new(SwarmConfig::default(), identity("local", vec![]), None);
        let distributor = WorkDistributor::new(mesh, 0, 20);

        let _ = distributor
            .await_result("task-1".to_string(), "peer-a".to_string())
            .await;
        assert!(!distributor.resolve_task(result("task-1")).await);
    }

    #[tokio::test]
    async fn cancel_all_rejects_every_outstanding_delegation() {
        let mesh = MeshManager::new(SwarmConfig::default(), identity("local", vec![]), None);
        let distributor = WorkDistributor::new(mesh, 0, 60_000);

        let distributor_for_wait = distributor.clone();
        let handle = tokio::spawn(async move {
            distributor_for_wait
                .await_result("task-1".to_string(), "peer-a".to_string())
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        distributor.cancel_all().await;

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, SwarmError::Cancelled(_)));
        assert_eq!(distributor.pending_count().await, 0);
    }
}
