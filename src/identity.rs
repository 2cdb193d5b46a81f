use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Immutable per-process identity of a mesh node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeIdentity {
    pub node_id: String,
    pub display_name: String,
    /// Absolute base URL other nodes use to reach this one.
    pub api_url: String,
    /// Tool names this node will execute on behalf of peers.
    pub capabilities: HashSet<String>,
    pub version: String,
}

impl NodeIdentity {
    /// Generate a fresh identity for a process instance. `node_id` is a v4 UUID;
    /// callers that want a stable id across restarts should persist and pass it
    /// back in rather than relying on this constructor.
    pub fn new(
        display_name: impl Into<String>,
        api_url: impl Into<String>,
        capabilities: impl IntoIterator<Item = String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            api_url: api_url.into(),
            capabilities: capabilities.into_iter().collect(),
            version: version.into(),
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}
