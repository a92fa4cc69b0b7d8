//! Client-facing stream event types.
//!
//! `RunEvent` is the line-delimited JSON object delivered to a live client
//! and reproduced verbatim when replaying a persisted run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::run::RunStatus;
use crate::step::Step;

/// One outbound event on a run's stream.
///
/// Serialized with a `type` tag:
/// `{"type":"token","run_id":"...","text":"..."}`,
/// `{"type":"trace","run_id":"...","step":{...}}`,
/// `{"type":"done","run_id":"...","status":"completed"}`,
/// `{"type":"error","run_id":"...","message":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Model text delta.
    Token { run_id: Uuid, text: String },
    /// A tool call, tool result, or handoff step.
    Trace { run_id: Uuid, step: Step },
    /// The run reached a terminal status.
    Done { run_id: Uuid, status: RunStatus },
    /// The run failed or the stream could not continue.
    Error { run_id: Uuid, message: String },
}

impl RunEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::Token { run_id, .. }
            | RunEvent::Trace { run_id, .. }
            | RunEvent::Done { run_id, .. }
            | RunEvent::Error { run_id, .. } => *run_id,
        }
    }

    /// Encode as a single NDJSON line (including the trailing newline).
    pub fn to_ndjson_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Short name of the event type, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            RunEvent::Token { .. } => "token",
            RunEvent::Trace { .. } => "trace",
            RunEvent::Done { .. } => "done",
            RunEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepPayload;

    #[test]
    fn test_token_event_shape() {
        let run_id = Uuid::now_v7();
        let event = RunEvent::Token {
            run_id,
            text: "Hel".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "token");
        assert_eq!(value["text"], "Hel");
        assert_eq!(value["run_id"], run_id.to_string());
    }

    #[test]
    fn test_done_event_shape() {
        let event = RunEvent::Done {
            run_id: Uuid::now_v7(),
            status: RunStatus::Completed,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "done");
        assert_eq!(value["status"], "completed");
    }

    #[test]
    fn test_trace_event_nests_step() {
        let run_id = Uuid::now_v7();
        let step = Step::new(
            run_id,
            0,
            StepPayload::Error {
                message: "boom".to_string(),
            },
        );
        let event = RunEvent::Trace { run_id, step };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["step"]["kind"], "error");
        assert_eq!(value["step"]["payload"]["message"], "boom");
    }

    #[test]
    fn test_ndjson_line_is_single_line() {
        let event = RunEvent::Error {
            run_id: Uuid::now_v7(),
            message: "line one\nline two".to_string(),
        };
        let line = event.to_ndjson_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let parsed: RunEvent = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed, event);
    }
}
