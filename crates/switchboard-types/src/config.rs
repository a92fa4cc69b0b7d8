//! Engine configuration types for Switchboard.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls
//! handoff limits, the persistence worker pool, live stream buffering, and
//! the set of agents the engine can run. All fields have defaults.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
///
/// Loaded from `~/.switchboard/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum handoff depth (top-level runs are depth 0).
    #[serde(default = "default_max_handoff_depth")]
    pub max_handoff_depth: u8,

    /// Name of the tool call the runtime uses to request a handoff.
    #[serde(default = "default_routing_tool")]
    pub routing_tool: String,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    /// Agents available for runs and handoffs.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

fn default_max_handoff_depth() -> u8 {
    3
}

fn default_routing_tool() -> String {
    "transfer_to_agent".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_handoff_depth: default_max_handoff_depth(),
            routing_tool: default_routing_tool(),
            persistence: PersistenceConfig::default(),
            stream: StreamConfig::default(),
            agents: Vec::new(),
        }
    }
}

/// Persistence worker pool and retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Maximum number of storage writes executing at once (process-wide).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Queued writes per run before `submit` waits for a free slot.
    #[serde(default = "default_lane_capacity")]
    pub lane_capacity: usize,

    /// Retries after the first attempt for transient storage errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubled on every retry.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Upper bound on a single backoff delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_workers() -> usize {
    8
}

fn default_lane_capacity() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            lane_capacity: default_lane_capacity(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Live event delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Buffered notices per subscriber; a subscriber that falls this far
    /// behind is detached.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_subscriber_buffer() -> usize {
    256
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

/// One agent the engine can execute.
///
/// Exactly one of `endpoint` (remote runtime speaking NDJSON raw events) or
/// `script` (file of NDJSON raw events replayed locally) should be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Environment variable holding a bearer token for `endpoint`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_handoff_depth, 3);
        assert_eq!(config.routing_tool, "transfer_to_agent");
        assert_eq!(config.persistence.workers, 8);
        assert_eq!(config.persistence.max_retries, 3);
        assert_eq!(config.stream.subscriber_buffer, 256);
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_engine_config_deserialize_with_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_handoff_depth, 3);
        assert_eq!(config.persistence, PersistenceConfig::default());
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
max_handoff_depth = 2
routing_tool = "route"

[persistence]
workers = 4
max_retries = 5

[stream]
subscriber_buffer = 64

[[agents]]
id = "it-support"
description = "General IT helpdesk"
endpoint = "http://localhost:9000/runs"
api_key_env = "IT_SUPPORT_KEY"

[[agents]]
id = "sql-agent"
script = "scripts/sql.ndjson"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_handoff_depth, 2);
        assert_eq!(config.routing_tool, "route");
        assert_eq!(config.persistence.workers, 4);
        assert_eq!(config.persistence.max_retries, 5);
        assert_eq!(config.persistence.lane_capacity, 1024);
        assert_eq!(config.stream.subscriber_buffer, 64);
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].endpoint.as_deref(), Some("http://localhost:9000/runs"));
        assert_eq!(config.agents[1].script.as_deref(), Some("scripts/sql.ndjson"));
        assert!(config.agents[1].description.is_empty());
    }
}
