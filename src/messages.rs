use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::NodeIdentity;
use crate::peer::PeerStatus;

/// Periodic liveness announcement broadcast by `MeshManager`'s heartbeat timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub active_sessions: u32,
    /// Load hint in `[0.0, 1.0]`.
    pub load: f64,
}

/// A peer record as carried inside a `GossipMessage`. Only active peers are
/// ever placed here; `status = left` peers are never propagated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipPeer {
    pub node_id: String,
    pub api_url: String,
    pub status: PeerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipMessage {
    pub sender_node_id: String,
    pub peers: Vec<GossipPeer>,
}

/// Constraints attached to a task delegation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConstraints {
    #[serde(default)]
    pub tool_allowlist: Vec<String>,
    pub max_tokens: Option<u64>,
    pub max_cost_usd: Option<f64>,
    pub max_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmTaskRequest {
    pub task_id: String,
    pub originator_node_id: String,
    pub originator_session_id: String,
    pub task_text: String,
    #[serde(default)]
    pub constraints: Option<TaskConstraints>,
    pub correlation_id: String,
    pub nonce: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Completed,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmTaskResult {
    pub task_id: String,
    pub peer_node_id: String,
    pub peer_session_id: String,
    pub status: TaskResultStatus,
    pub findings: Value,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

/// Response body for `POST /join`, `POST /leave`, `POST /heartbeat`, `POST /task/result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Request body for `POST /join`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub identity: NodeIdentity,
}

/// Request body for `POST /leave`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub node_id: String,
    pub reason: Option<String>,
}

/// Response body for `POST /task/request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequestDecision {
    pub accepted: bool,
    pub reason: Option<String>,
    pub session_id: Option<String>,
}

impl TaskRequestDecision {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
            session_id: None,
        }
    }

    pub fn accepted(session_id: impl Into<String>) -> Self {
        Self {
            accepted: true,
            reason: None,
            session_id: Some(session_id.into()),
        }
    }
}
