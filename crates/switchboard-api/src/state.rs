//! Application state shared across CLI commands and HTTP handlers.
//!
//! Holds the run coordinator and thread service (sharing one persistence
//! gateway over SQLite) and the loaded engine config.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use switchboard_core::persistence::PersistenceGateway;
use switchboard_core::run::RunCoordinator;
use switchboard_core::thread::ThreadService;
use switchboard_infra::config::{build_registry, load_engine_config, resolve_data_dir};
use switchboard_infra::sqlite::{DatabasePool, SqliteRunStore};
use switchboard_types::config::EngineConfig;

/// Concrete coordinator over the SQLite store.
pub type Coordinator = RunCoordinator<SqliteRunStore>;

/// Concrete thread service over the SQLite store.
pub type Threads = ThreadService<SqliteRunStore>;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub threads: Arc<Threads>,
    pub config: Arc<EngineConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize from the resolved data directory.
    pub async fn init() -> anyhow::Result<Self> {
        Self::init_at(resolve_data_dir()).await
    }

    /// Create `data_dir` if needed, load `config.toml`, open the database,
    /// and register the configured agents.
    pub async fn init_at(data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_engine_config(&data_dir).await;
        let agents = Arc::new(
            build_registry(&config, &data_dir)
                .await
                .context("invalid [[agents]] configuration")?,
        );

        let db_pool = DatabasePool::open(&data_dir)
            .await
            .context("failed to open database")?;

        let store = Arc::new(SqliteRunStore::new(db_pool));
        let gateway = PersistenceGateway::new(store, &config.persistence);
        let coordinator = RunCoordinator::new(gateway.clone(), Arc::clone(&agents), &config);
        let threads = ThreadService::new(gateway, agents);

        tracing::debug!(
            data_dir = %data_dir.display(),
            agents = coordinator.agents().len(),
            "application state initialized"
        );

        Ok(Self {
            coordinator: Arc::new(coordinator),
            threads: Arc::new(threads),
            config: Arc::new(config),
            data_dir,
        })
    }
}

/// State over a temp data dir with scripted agents `(id, script body)`.
#[cfg(test)]
pub(crate) async fn test_state(data_dir: &std::path::Path, agents: &[(&str, &str)]) -> AppState {
    let mut config = String::from("[persistence]\nbase_backoff_ms = 1\nmax_backoff_ms = 4\n");
    for (id, script) in agents {
        let file = format!("{id}.ndjson");
        tokio::fs::write(data_dir.join(&file), script).await.unwrap();
        config.push_str(&format!("\n[[agents]]\nid = \"{id}\"\nscript = \"{file}\"\n"));
    }
    tokio::fs::write(data_dir.join("config.toml"), config).await.unwrap();
    AppState::init_at(data_dir.to_path_buf()).await.unwrap()
}
