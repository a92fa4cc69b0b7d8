use thiserror::Error;
use uuid::Uuid;

/// Errors from repository operations (used by trait definitions in switchboard-core).
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("database busy: {0}")]
    Busy(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Connection(_) | RepositoryError::Busy(_))
    }
}

/// Errors from the persistence gateway, surfaced as run failure.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("write failed after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },

    #[error("write rejected: {0}")]
    Permanent(String),

    #[error("write lane for run {0} is closed")]
    LaneClosed(Uuid),
}

/// Errors raised by an agent runtime (runtime-fatal: the run fails).
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("agent '{0}' is not registered")]
    UnknownAgent(String),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    #[error("runtime stream error: {0}")]
    Stream(String),

    #[error("undecodable runtime event: {0}")]
    Decode(String),
}

/// Reasons a requested handoff was not performed.
///
/// All variants are non-fatal: the current run keeps answering directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("handoff depth exceeded: run is at depth {depth}, maximum is {max_depth}")]
    DepthExceeded { depth: u8, max_depth: u8 },

    #[error("handoff cycle: agent '{target}' already in chain [{}]", chain.join(" -> "))]
    Cycle { target: String, chain: Vec<String> },

    #[error("handoff target '{0}' is not a registered agent")]
    UnknownAgent(String),
}

/// Errors from thread management.
#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("thread {0} not found")]
    NotFound(Uuid),

    #[error("invalid thread: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors from run lifecycle operations.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("thread {thread_id} is busy with run {active_run_id}")]
    ThreadBusy { thread_id: Uuid, active_run_id: Uuid },

    #[error("thread {0} not found")]
    ThreadNotFound(Uuid),

    #[error("thread {0} is archived")]
    ThreadArchived(Uuid),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("agent '{0}' is not registered")]
    UnknownAgent(String),

    #[error("invalid run request: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}
