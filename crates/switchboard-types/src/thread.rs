//! Conversation thread types.
//!
//! A `Thread` is the conversation container between a user and one agent.
//! Threads are never physically removed: deleting one flips its status to
//! `Deleted` and keeps the record (and its runs) for history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a thread.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (status IN ('active', 'archived', 'deleted'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Active,
    Archived,
    Deleted,
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadStatus::Active => write!(f, "active"),
            ThreadStatus::Archived => write!(f, "archived"),
            ThreadStatus::Deleted => write!(f, "deleted"),
        }
    }
}

impl FromStr for ThreadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ThreadStatus::Active),
            "archived" => Ok(ThreadStatus::Archived),
            "deleted" => Ok(ThreadStatus::Deleted),
            other => Err(format!("invalid thread status: '{other}'")),
        }
    }
}

/// A conversation between a user and a single agent.
///
/// Threads own their runs. Handoff sub-runs get a thread of their own,
/// bound to the target agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub agent_id: String,
    pub status: ThreadStatus,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Create a new active thread for the given agent.
    pub fn new(agent_id: impl Into<String>, title: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            agent_id: agent_id.into(),
            status: ThreadStatus::Active,
            title,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether new runs may be started on this thread.
    pub fn accepts_runs(&self) -> bool {
        self.status == ThreadStatus::Active
    }
}

/// Maximum length (in characters) of a title derived from a user message.
const DERIVED_TITLE_MAX_CHARS: usize = 60;

/// Derive a thread title from the first user message.
///
/// Takes the first non-empty line, collapses whitespace, and truncates to
/// 60 characters with a trailing ellipsis. Returns `None` for blank input.
pub fn derive_title(message: &str) -> Option<String> {
    let line = message.lines().map(str::trim).find(|l| !l.is_empty())?;
    let collapsed: String = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= DERIVED_TITLE_MAX_CHARS {
        return Some(collapsed);
    }
    let truncated: String = collapsed.chars().take(DERIVED_TITLE_MAX_CHARS).collect();
    Some(format!("{}...", truncated.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_status_roundtrip() {
        for status in [
            ThreadStatus::Active,
            ThreadStatus::Archived,
            ThreadStatus::Deleted,
        ] {
            let parsed: ThreadStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_thread_status_serde() {
        let json = serde_json::to_string(&ThreadStatus::Archived).unwrap();
        assert_eq!(json, "\"archived\"");
    }

    #[test]
    fn test_invalid_status_rejected() {
        let err = "gone".parse::<ThreadStatus>().unwrap_err();
        assert!(err.contains("gone"));
    }

    #[test]
    fn test_new_thread_is_active() {
        let thread = Thread::new("it-support", None);
        assert_eq!(thread.status, ThreadStatus::Active);
        assert!(thread.accepts_runs());
        assert_eq!(thread.created_at, thread.updated_at);
    }

    #[test]
    fn test_derive_title_short_message() {
        assert_eq!(derive_title("  Hello there  "), Some("Hello there".to_string()));
    }

    #[test]
    fn test_derive_title_uses_first_non_empty_line() {
        let title = derive_title("\n\n  My VPN   keeps dropping\nsecond line");
        assert_eq!(title.as_deref(), Some("My VPN keeps dropping"));
    }

    #[test]
    fn test_derive_title_truncates_long_message() {
        let long = "a ".repeat(100);
        let title = derive_title(&long).unwrap();
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= DERIVED_TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn test_derive_title_blank_is_none() {
        assert!(derive_title("   \n  ").is_none());
    }
}
