// ===================================================================================================
// Error Handling — Swarm Mesh Core
// ===================================================================================================
//
// Structured error categories for the swarm mesh core. The general policy is graceful
// degradation over propagation: membership and gossip errors never crash a node, they
// surface as `{accepted: false, reason}` or similar structured results. Only programmer
// errors (capacity overflow, malformed config) propagate as `SwarmError`.
// ===================================================================================================

use thiserror::Error;

/// Errors surfaced by the swarm mesh core.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// The peer table is at `max_peers` capacity and cannot accept a new entry.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A heartbeat, delegation target, or bookkeeping call referenced a node_id
    /// that is not present (or not active) in the peer table.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// A SwarmTaskRequest's nonce was already seen inside `nonce_window_ms`.
    #[error("replayed nonce: {0}")]
    ReplayedNonce(String),

    /// Connection refused, timeout, or non-2xx status talking to a peer.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// A delegation's `delegation_timeout_ms` elapsed with no result posted back.
    #[error("delegation timed out: {0}")]
    DelegationTimeout(String),

    /// Peer selection produced an empty candidate list.
    #[error("no suitable peers: {0}")]
    NoSuitablePeers(String),

    /// A pending delegation was cancelled (e.g. by `WorkDistributor::cancel_all`).
    #[error("delegation cancelled: {0}")]
    Cancelled(String),

    /// Configuration could not be parsed or was internally inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem I/O failure (config load/save).
    #[error("io error: {0}")]
    Io(String),

    /// JSON (de)serialization failure for a wire message.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all for conditions that don't fit another category.
    #[error("{0}")]
    Generic(String),
}

impl From<std::io::Error> for SwarmError {
    fn from(error: std::io::Error) -> Self {
        SwarmError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for SwarmError {
    fn from(error: serde_json::Error) -> Self {
        SwarmError::Serialization(error.to_string())
    }
}

impl From<toml::de::Error> for SwarmError {
    fn from(error: toml::de::Error) -> Self {
        SwarmError::Config(error.to_string())
    }
}

impl From<toml::ser::Error> for SwarmError {
    fn from(error: toml::ser::Error) -> Self {
        SwarmError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for SwarmError {
    fn from(error: reqwest::Error) -> Self {
        SwarmError::TransportFailure(error.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for SwarmError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        SwarmError::Cancelled("result channel dropped".to_string())
    }
}

/// Result type alias for swarm mesh core operations.
pub type SwarmResult<T> = Result<T, SwarmError>;
