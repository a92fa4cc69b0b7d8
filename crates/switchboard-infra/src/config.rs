//! Engine configuration loader for Switchboard.
//!
//! Reads `config.toml` from the data directory (`~/.switchboard/` unless
//! `SWITCHBOARD_DATA_DIR` is set) into [`EngineConfig`], and turns its
//! `[[agents]]` entries into an [`AgentRegistry`]. A missing or malformed
//! file falls back to defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use secrecy::SecretString;

use switchboard_core::runtime::{AgentRegistry, BoxAgentRuntime};
use switchboard_types::config::{AgentConfig, EngineConfig};

use crate::runtime::{HttpAgentRuntime, scripted_runtime};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SWITCHBOARD_DATA_DIR";

/// Deepest handoff chain the engine accepts.
const MAX_HANDOFF_DEPTH_CEILING: u8 = 16;

/// Resolve the data directory: `$SWITCHBOARD_DATA_DIR`, else
/// `~/.switchboard`, else `./.switchboard`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchboard")
}

/// Load `{data_dir}/config.toml`, clamped to sane bounds.
///
/// - Missing file: defaults.
/// - Unreadable or unparseable file: a warning, then defaults.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => clamp(config),
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            EngineConfig::default()
        }
    }
}

/// Force every numeric setting into its valid range.
pub fn clamp(mut config: EngineConfig) -> EngineConfig {
    let defaults = EngineConfig::default();

    if config.max_handoff_depth > MAX_HANDOFF_DEPTH_CEILING {
        tracing::warn!(
            configured = config.max_handoff_depth,
            ceiling = MAX_HANDOFF_DEPTH_CEILING,
            "max_handoff_depth clamped"
        );
        config.max_handoff_depth = MAX_HANDOFF_DEPTH_CEILING;
    }
    if config.routing_tool.trim().is_empty() {
        config.routing_tool = defaults.routing_tool;
    }

    let p = &mut config.persistence;
    p.workers = p.workers.max(1);
    p.lane_capacity = p.lane_capacity.max(1);
    p.base_backoff_ms = p.base_backoff_ms.max(1);
    p.max_backoff_ms = p.max_backoff_ms.max(p.base_backoff_ms);

    config.stream.subscriber_buffer = config.stream.subscriber_buffer.max(1);
    config
}

/// Build the agent registry from `[[agents]]`.
///
/// Relative script paths resolve against `data_dir`. Fails on duplicate
/// ids, on entries with neither or both of `endpoint` and `script`, and on
/// unreadable scripts.
pub async fn build_registry(config: &EngineConfig, data_dir: &Path) -> anyhow::Result<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    for agent in &config.agents {
        if agent.id.trim().is_empty() {
            bail!("agent entry with an empty id");
        }
        if registry.contains(&agent.id) {
            bail!("agent '{}' is configured twice", agent.id);
        }
        let runtime = build_runtime(agent, data_dir)
            .await
            .with_context(|| format!("agent '{}'", agent.id))?;
        registry.register(agent.id.clone(), agent.description.clone(), runtime);
        tracing::info!(agent_id = %agent.id, "agent registered");
    }
    Ok(registry)
}

async fn build_runtime(agent: &AgentConfig, data_dir: &Path) -> anyhow::Result<BoxAgentRuntime> {
    match (&agent.endpoint, &agent.script) {
        (Some(endpoint), None) => {
            let api_key = match &agent.api_key_env {
                Some(var) => Some(SecretString::from(
                    std::env::var(var).with_context(|| format!("environment variable {var} is not set"))?,
                )),
                None => None,
            };
            let runtime = HttpAgentRuntime::new(agent.id.clone(), endpoint.clone(), api_key)?;
            Ok(BoxAgentRuntime::new(runtime))
        }
        (None, Some(script)) => {
            let path = data_dir.join(script);
            let runtime = scripted_runtime(&agent.id, &path).await?;
            Ok(BoxAgentRuntime::new(runtime))
        }
        (Some(_), Some(_)) => bail!("set either `endpoint` or `script`, not both"),
        (None, None) => bail!("one of `endpoint` or `script` is required"),
    }
}
