//! Script-file agents: NDJSON raw events replayed by `ScriptedRuntime`.

use std::path::{Path, PathBuf};

use thiserror::Error;

use switchboard_core::runtime::ScriptedRuntime;
use switchboard_types::runtime::RawEvent;

use super::ndjson::parse_line;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("cannot read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Read a file of raw events, one JSON object per line.
///
/// Blank lines are skipped. Line numbers in errors are 1-based.
pub async fn load_script(path: &Path) -> Result<Vec<RawEvent>, ScriptError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let mut events = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        match parse_line(line.as_bytes()) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(err) => {
                return Err(ScriptError::Parse {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    message: err.to_string(),
                });
            }
        }
    }
    Ok(events)
}

/// Build a `ScriptedRuntime` named `name` from a script file.
pub async fn scripted_runtime(name: &str, path: &Path) -> Result<ScriptedRuntime, ScriptError> {
    let events = load_script(path).await?;
    tracing::debug!(agent_id = %name, path = %path.display(), events = events.len(), "loaded agent script");
    Ok(ScriptedRuntime::new(name, events))
}
