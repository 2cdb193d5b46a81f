// ===================================================================================================
// PeerTable — authoritative in-process membership state
// ===================================================================================================
//
// Bounded capacity (`max_peers`), pure synchronous methods guarded by a single RwLock.
// The table never regresses status on its own: `sweep` moves peers forward through
// active -> suspected -> unreachable -> evicted as their last heartbeat ages, and a
// fresh heartbeat resets a peer straight back to active. `left` is terminal.
// ===================================================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{SwarmError, SwarmResult};
use crate::identity::NodeIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    Active,
    Suspected,
    Unreachable,
    Left,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerEntry {
    pub identity: NodeIdentity,
    pub status: PeerStatus,
    pub last_heartbeat_at: DateTime<Utc>,
    pub last_latency_ms: u64,
    pub consecutive_failures: u32,
    pub joined_at: DateTime<Utc>,
}

/// Thresholds consulted by `sweep`, all in milliseconds. Must satisfy
/// `suspected_after_ms <= unreachable_after_ms <= evict_after_ms`.
#[derive(Debug, Clone, Copy)]
pub struct SweepThresholds {
    pub suspected_after_ms: u64,
    pub unreachable_after_ms: u64,
    pub evict_after_ms: u64,
}

/// Result of one `sweep` pass: node_ids that transitioned to each state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub suspected: Vec<String>,
    pub unreachable: Vec<String>,
    pub evicted: Vec<String>,
}

#[derive(Clone)]
pub struct PeerTable {
    max_peers: usize,
    entries: Arc<RwLock<HashMap<String, PeerEntry>>>,
}

impl PeerTable {
    pub fn new(max_peers: usize) -> Self {
        Self {
            max_peers,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Upsert an identity. Re-adding a known peer refreshes its identity fields,
    /// resets status to active, stamps the heartbeat, and clears its failure
    /// count without growing the table. Adding a brand new peer into a full
    /// table fails with `CapacityExceeded`.
    pub async fn add(&self, identity: NodeIdentity) -> SwarmResult<PeerEntry> {
        let mut entries = self.entries.write().await;
        let now = Utc::now();

        if let Some(existing) = entries.get_mut(&identity.node_id) {
            existing.identity = identity;
            existing.status = PeerStatus::Active;
            existing.last_heartbeat_at = now;
            existing.consecutive_failures = 0;
            return Ok(existing.clone());
        }

        if entries.len() >= self.max_peers {
            return Err(SwarmError::CapacityExceeded(format!(
                "peer table full at {} entries",
                self.max_peers
            )));
        }

        let entry = PeerEntry {
            identity: identity.clone(),
            status: PeerStatus::Active,
            last_heartbeat_at: now,
            last_latency_ms: 0,
            consecutive_failures: 0,
            joined_at: now,
        };
        entries.insert(identity.node_id.clone(), entry.clone());
        Ok(entry)
    }

    pub async fn remove(&self, node_id: &str) -> Option<PeerEntry> {
        self.entries.write().await.remove(node_id)
    }

    pub async fn get(&self, node_id: &str) -> Option<PeerEntry> {
        self.entries.read().await.get(node_id).cloned()
    }

    pub async fn get_all(&self) -> Vec<PeerEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn get_active(&self) -> Vec<PeerEntry> {
        self.get_by_status(PeerStatus::Active).await
    }

    pub async fn get_by_status(&self, status: PeerStatus) -> Vec<PeerEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.status == status)
            .cloned()
            .collect()
    }

    /// Active peers whose capability set contains `capability`.
    pub async fn get_by_capability(&self, capability: &str) -> Vec<PeerEntry> {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| {
                entry.status == PeerStatus::Active && entry.identity.has_capability(capability)
            })
            .cloned()
            .collect()
    }

    /// Record an inbound heartbeat. Returns `false` if `node_id` is unknown.
    pub async fn record_heartbeat(&self, node_id: &str, latency_ms: u64) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(node_id) {
            Some(entry) => {
                entry.status = PeerStatus::Active;
                entry.last_heartbeat_at = Utc::now();
                entry.last_latency_ms = latency_ms;
                entry.consecutive_failures = 0;
                true
            }
            None => false,
        }
    }

    /// Record a client-side send failure (e.g. heartbeat broadcast to this peer
    /// failed). Returns the new failure count, or -1 if `node_id` is unknown.
    /// Thresholds for status transitions live in `sweep`, not here.
    pub async fn record_failure(&self, node_id: &str) -> i64 {
        let mut entries = self.entries.write().await;
        match entries.get_mut(node_id) {
            Some(entry) => {
                entry.consecutive_failures += 1;
                entry.consecutive_failures as i64
            }
            None => -1,
        }
    }

    /// Mark a peer as having left. Terminal: the entry is not removed and a
    /// `left` status is never touched by `sweep`.
    pub async fn mark_left(&self, node_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(node_id) {
            Some(entry) => {
                entry.status = PeerStatus::Left;
                true
            }
            None => false,
        }
    }

    /// Apply the first matching, highest-threshold transition to every
    /// non-`left` entry based on heartbeat age. Monotone: status never
    /// regresses within a single pass, and a fresh heartbeat is the only way
    /// to return a peer to `active`.
    pub async fn sweep(&self, thresholds: SweepThresholds) -> SweepReport {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        let mut report = SweepReport::default();
        let mut to_evict = Vec::new();

        for (node_id, entry) in entries.iter_mut() {
            if entry.status == PeerStatus::Left {
                continue;
            }
            let age_ms = (now - entry.last_heartbeat_at).num_milliseconds().max(0) as u64;

            if age_ms >= thresholds.evict_after_ms {
                to_evict.push(node_id.clone());
            } else if age_ms >= thresholds.unreachable_after_ms {
                if entry.status != PeerStatus::Unreachable {
                    entry.status = PeerStatus::Unreachable;
                    report.unreachable.push(node_id.clone());
                }
            } else if age_ms >= thresholds.suspected_after_ms && entry.status == PeerStatus::Active
            {
                entry.status = PeerStatus::Suspected;
                report.suspected.push(node_id.clone());
            }
        }

        for node_id in &to_evict {
            entries.remove(node_id);
        }
        report.evicted = to_evict;
        report
    }

    pub async fn known_ids(&self) -> HashSet<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(node_id: &str) -> NodeIdentity {
        NodeIdentity {
            node_id: node_id.to_string(),
            display_name: node_id.to_string(),
            api_url: format!("http://{node_id}"),
            capabilities: Default::default(),
            version: "1.0".to_string(),
        }
    }

    #[tokio::test]
    async fn add_rejects_past_capacity() {
        let table = PeerTable::new(1);
        table.add(identity("a")).await.unwrap();
        let err = table.add(identity("b")).await.unwrap_err();
        assert!(matches!(err, SwarmError::CapacityExceeded(_)));
    }

    #[tokio::test]
    async fn re_add_refreshes_without_growing_table() {
        let table = PeerTable::new(1);
        table.add(identity("a")).await.unwrap();
        table.add(identity("a")).await.unwrap();
        assert_eq!(table.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn record_heartbeat_unknown_peer_returns_false() {
        let table = PeerTable::new(10);
        assert!(!table.record_heartbeat("ghost", 5).await);
    }

    #[tokio::test]
    async fn record_failure_unknown_peer_returns_minus_one() {
        let table = PeerTable::new(10);
        assert_eq!(table.record_failure("ghost").await, -1);
    }

    #[tokio::test]
    async fn sweep_suspects_peer_at_20s_with_15_30_120_thresholds() {
        let table = PeerTable::new(10);
        let entry = table.add(identity("remote-1")).await.unwrap();
        {
            let mut entries = table.entries.write().await;
            entries.get_mut(&entry.identity.node_id).unwrap().last_heartbeat_at =
                Utc::now() - chrono::Duration::seconds(20);
        }
        let thresholds = SweepThresholds {
            suspected_after_ms: 15_000,
            unreachable_after_ms: 30_000,
            evict_after_ms: 120_000,
        };
        let report = table.sweep(thresholds).await;
        assert_eq!(report.suspected, vec!["remote-1".to_string()]);
        assert!(report.unreachable.is_empty());
        assert!(report.evicted.is_empty());
        assert_eq!(table.get("remote-1").await.unwrap().status, PeerStatus::Suspected);
    }

    #[tokio::test]
    async fn sweep_evicts_peer_at_130s() {
        let table = PeerTable::new(10);
        table.add(identity("remote-1")).await.unwrap();
        {
            let mut entries = table.entries.write().await;
            entries.get_mut("remote-1").unwrap().last_heartbeat_at =
                Utc::now() - chrono::Duration::seconds(130);
        }
        let thresholds = SweepThresholds {
            suspected_after_ms: 15_000,
            unreachable_after_ms: 30_000,
            evict_after_ms: 120_000,
        };
        let report = table.sweep(thresholds).await;
        assert!(report.suspected.is_empty());
        assert!(report.unreachable.is_empty());
        assert_eq!(report.evicted, vec!["remote-1".to_string()]);
        assert!(table.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn sweep_reports_unreachable_only_on_the_transition() {
        let table = PeerTable::new(10);
        let entry = table.add(identity("remote-1")).await.unwrap();
        {
            let mut entries = table.entries.write().await;
            entries.get_mut(&entry.identity.node_id).unwrap().last_heartbeat_at =
                Utc::now() - chrono::Duration::seconds(35);
        }
        let thresholds = SweepThresholds {
            suspected_after_ms: 15_000,
            unreachable_after_ms: 30_000,
            evict_after_ms: 120_000,
        };
        let first = table.sweep(thresholds).await;
        assert_eq!(first.unreachable, vec!["remote-1".to_string()]);

        let second = table.sweep(thresholds).await;
        assert!(
            second.unreachable.is_empty(),
            "a peer already unreachable should not be re-reported on a later sweep"
        );
        assert_eq!(table.get("remote-1").await.unwrap().status, PeerStatus::Unreachable);
    }

    #[tokio::test]
    async fn sweep_never_moves_left_peers() {
        let table = PeerTable::new(10);
        table.add(identity("a")).await.unwrap();
        table.mark_left("a").await;
        {
            let mut entries = table.entries.write().await;
            entries.get_mut("a").unwrap().last_heartbeat_at =
                Utc::now() - chrono::Duration::seconds(1_000);
        }
        let thresholds = SweepThresholds {
            suspected_after_ms: 15_000,
            unreachable_after_ms: 30_000,
            evict_after_ms: 120_000,
        };
        let report = table.sweep(thresholds).await;
        assert_eq!(report, SweepReport::default());
        assert_eq!(table.get("a").await.unwrap().status, PeerStatus::Left);
    }

    #[tokio::test]
    async fn get_by_capability_filters_active_peers_with_capability() {
        let table = PeerTable::new(10);
        let mut a = identity("a");
        a.capabilities.insert("read-file".to_string());
        table.add(a).await.unwrap();
        table.add(identity("b")).await.unwrap();

        let matches = table.get_by_capability("read-file").await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].identity.node_id, "a");
    }
}
