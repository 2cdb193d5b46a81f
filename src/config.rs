use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SwarmResult;

/// Configuration for a swarm mesh node. Field names and defaults follow the
/// wire-level config contract (durations are all milliseconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    pub enabled: bool,
    /// Shared bearer token peers must present. `None` disables auth (tests/local dev).
    pub token: Option<String>,
    pub node_name: String,
    /// Absolute base URL this node is reachable at.
    pub api_url: String,
    /// Seed peer base URLs used for initial discovery.
    pub seeds: Vec<String>,
    pub mdns: bool,
    pub gossip: bool,
    pub max_peers: usize,
    pub heartbeat_interval_ms: u64,
    pub sweep_interval_ms: u64,
    pub suspected_after_ms: u64,
    pub unreachable_after_ms: u64,
    pub evict_after_ms: u64,
    pub delegation_timeout_ms: u64,
    pub nonce_window_ms: u64,
    pub version: String,
    pub capabilities: Vec<String>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
            node_name: "swarm-node".to_string(),
            api_url: "http://127.0.0.1:4310".to_string(),
            seeds: Vec::new(),
            mdns: false,
            gossip: true,
            max_peers: 50,
            heartbeat_interval_ms: 5_000,
            sweep_interval_ms: 10_000,
            suspected_after_ms: 15_000,
            unreachable_after_ms: 30_000,
            evict_after_ms: 120_000,
            delegation_timeout_ms: 300_000,
            nonce_window_ms: 300_000,
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: Vec::new(),
        }
    }
}

impl SwarmConfig {
    /// Load configuration from a TOML file, falling back to defaults if the path
    /// is absent. `SWARM_TOKEN` and `SWARM_API_URL` environment variables, when
    /// set, override the corresponding fields after the file is loaded.
    pub fn load_or_default(config_path: Option<PathBuf>) -> SwarmResult<Self> {
        let mut config = if let Some(path) = &config_path {
            if path.exists() {
                let raw = std::fs::read_to_string(path)?;
                let config: SwarmConfig = toml::from_str(&raw)?;
                tracing::info!("loaded configuration from {:?}", path);
                config
            } else {
                tracing::info!("config path {:?} does not exist, using defaults", path);
                SwarmConfig::default()
            }
        } else {
            tracing::info!("using default configuration");
            SwarmConfig::default()
        };

        if let Ok(token) = std::env::var("SWARM_TOKEN") {
            config.token = Some(token);
        }
        if let Ok(api_url) = std::env::var("SWARM_API_URL") {
            config.api_url = api_url;
        }

        Ok(config)
    }

    /// Persist configuration to a TOML file, creating parent directories as needed.
    pub fn save(&self, config_path: &PathBuf) -> SwarmResult<()> {
        let raw = toml::to_string_pretty(self)?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, raw)?;
        tracing::info!("configuration saved to {:?}", config_path);
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn delegation_timeout(&self) -> Duration {
        Duration::from_millis(self.delegation_timeout_ms)
    }

    pub fn thresholds(&self) -> crate::peer::SweepThresholds {
        crate::peer::SweepThresholds {
            suspected_after_ms: self.suspected_after_ms,
            unreachable_after_ms: self.unreachable_after_ms,
            evict_after_ms: self.evict_after_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SwarmConfig::default();
        assert_eq!(config.max_peers, 50);
        assert_eq!(config.heartbeat_interval_ms, 5_000);
        assert_eq!(config.sweep_interval_ms, 10_000);
        assert_eq!(config.suspected_after_ms, 15_000);
        assert_eq!(config.unreachable_after_ms, 30_000);
        assert_eq!(config.evict_after_ms, 120_000);
        assert_eq!(config.delegation_timeout_ms, 300_000);
        assert_eq!(config.nonce_window_ms, 300_000);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.toml");
        let config = SwarmConfig {
            node_name: "alpha".to_string(),
            ..SwarmConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = SwarmConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.node_name, "alpha");
    }
}
