//! Run lifecycle types.
//!
//! A `Run` is one execution attempt in response to one user message. Runs
//! created by a handoff carry `parent_run_id` and a depth one greater than
//! their parent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::step::Step;

/// Lifecycle status of a run.
///
/// `Pending` and `Streaming` are the only non-terminal states; a thread may
/// hold at most one run in either of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Whether the run has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// pending -> streaming | failed | cancelled;
    /// streaming -> completed | failed | cancelled. Terminal states are final.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Pending, RunStatus::Streaming)
            | (RunStatus::Pending, RunStatus::Failed)
            | (RunStatus::Pending, RunStatus::Cancelled) => true,
            (RunStatus::Streaming, RunStatus::Completed)
            | (RunStatus::Streaming, RunStatus::Failed)
            | (RunStatus::Streaming, RunStatus::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Streaming => write!(f, "streaming"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "streaming" => Ok(RunStatus::Streaming),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

/// One execution of an agent in response to one user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub thread_id: Uuid,
    /// Agent executing this run (denormalized from the thread).
    pub agent_id: String,
    /// The user message this run answers.
    pub input: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set when this run is a handoff sub-run.
    pub parent_run_id: Option<Uuid>,
    /// 0 for top-level runs.
    pub depth: u8,
    /// Terminal error message for failed runs.
    pub error: Option<String>,
}

impl Run {
    /// Create a pending top-level run.
    pub fn new(thread_id: Uuid, agent_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            thread_id,
            agent_id: agent_id.into(),
            input: input.into(),
            status: RunStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            parent_run_id: None,
            depth: 0,
            error: None,
        }
    }

    /// Create a pending sub-run delegated from `parent`.
    ///
    /// The child lives in its own thread and sits one level deeper.
    pub fn child_of(
        parent: &Run,
        thread_id: Uuid,
        agent_id: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            parent_run_id: Some(parent.id),
            depth: parent.depth.saturating_add(1),
            ..Self::new(thread_id, agent_id, input)
        }
    }

    /// Move the run to `next`, stamping `ended_at` on terminal states.
    ///
    /// Returns `false` (and leaves the run untouched) for illegal transitions.
    pub fn transition(&mut self, next: RunStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A run together with its ordered steps (historical reconstruction view).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunWithSteps {
    pub run: Run,
    pub steps: Vec<Step>,
}
