//! Step and trace payload types.
//!
//! A `Step` is one ordered, immutable unit of a run's execution trace. The
//! payload is a closed, tagged set of shapes: model text, tool call, tool
//! result, handoff, and terminal error. New upstream event shapes are mapped
//! onto these by the trace extractor; the set itself does not grow.
//!
//! Wire shape (payload flattened next to the step header):
//!
//! ```json
//! {"id":"...","run_id":"...","sequence":3,"kind":"tool_call",
//!  "payload":{"call_id":"c1","tool_name":"search_docs","arguments":{"query":"vpn issue"}},
//!  "created_at":"..."}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Discriminant of a step payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ModelCall,
    ToolCall,
    ToolCallResult,
    Handoff,
    Error,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::ModelCall => write!(f, "model_call"),
            StepKind::ToolCall => write!(f, "tool_call"),
            StepKind::ToolCallResult => write!(f, "tool_call_result"),
            StepKind::Handoff => write!(f, "handoff"),
            StepKind::Error => write!(f, "error"),
        }
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model_call" => Ok(StepKind::ModelCall),
            "tool_call" => Ok(StepKind::ToolCall),
            "tool_call_result" => Ok(StepKind::ToolCallResult),
            "handoff" => Ok(StepKind::Handoff),
            "error" => Ok(StepKind::Error),
            other => Err(format!("invalid step kind: '{other}'")),
        }
    }
}

/// A tool invocation requested by the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// How a tool result relates to the calls seen earlier in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultStatus {
    /// Answers an open call earlier in the same run.
    #[default]
    Matched,
    /// No open call with this id was known (out of order or unknown).
    Unmatched,
    /// Synthesized at run termination for a call that never got a result.
    Orphaned,
}

/// The outcome of a tool invocation.
///
/// Exactly one of `output` / `error` is normally set; orphaned results carry
/// neither. A tool failure is recorded here as data and never fails the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub status: ToolResultStatus,
}

impl ToolResult {
    /// A synthetic result for a call that was still open at run termination.
    pub fn orphaned(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: None,
            error: None,
            latency_ms: None,
            status: ToolResultStatus::Orphaned,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Delegation of a turn from one agent to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub source_agent_id: String,
    pub target_agent_id: String,
    pub child_run_id: Uuid,
    pub reason: String,
}

/// Kind-specific step content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum StepPayload {
    /// A chunk of model output text.
    ModelCall { text: String },
    ToolCall(ToolCall),
    ToolCallResult(ToolResult),
    Handoff(HandoffRecord),
    /// Terminal failure of the run.
    Error { message: String },
}

impl StepPayload {
    pub fn kind(&self) -> StepKind {
        match self {
            StepPayload::ModelCall { .. } => StepKind::ModelCall,
            StepPayload::ToolCall(_) => StepKind::ToolCall,
            StepPayload::ToolCallResult(_) => StepKind::ToolCallResult,
            StepPayload::Handoff(_) => StepKind::Handoff,
            StepPayload::Error { .. } => StepKind::Error,
        }
    }

    /// Whether this payload ends the run's trace.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepPayload::Error { .. })
    }
}

/// One atomic, immutable unit of a run's execution trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub run_id: Uuid,
    /// Position within the run: 0, 1, 2, ... with no gaps.
    pub sequence: u64,
    #[serde(flatten)]
    pub payload: StepPayload,
    pub created_at: DateTime<Utc>,
}

impl Step {
    pub fn new(run_id: Uuid, sequence: u64, payload: StepPayload) -> Self {
        Self {
            id: Uuid::now_v7(),
            run_id,
            sequence,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> StepKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_kind_roundtrip() {
        for kind in [
            StepKind::ModelCall,
            StepKind::ToolCall,
            StepKind::ToolCallResult,
            StepKind::Handoff,
            StepKind::Error,
        ] {
            let parsed: StepKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_step_wire_shape_flattens_kind_and_payload() {
        let step = Step::new(
            Uuid::now_v7(),
            3,
            StepPayload::ToolCall(ToolCall {
                call_id: "c1".to_string(),
                tool_name: "search_docs".to_string(),
                arguments: json!({"query": "vpn issue"}),
            }),
        );
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["kind"], "tool_call");
        assert_eq!(value["sequence"], 3);
        assert_eq!(value["payload"]["tool_name"], "search_docs");
        assert_eq!(value["payload"]["arguments"]["query"], "vpn issue");
    }

    #[test]
    fn test_step_deserializes_from_wire_shape() {
        let step = Step::new(
            Uuid::now_v7(),
            0,
            StepPayload::ModelCall {
                text: "Hello".to_string(),
            },
        );
        let json = serde_json::to_string(&step).unwrap();
        let parsed: Step = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, step);
        assert_eq!(parsed.kind(), StepKind::ModelCall);
    }

    #[test]
    fn test_payload_from_kind_and_payload_columns() {
        let value = json!({
            "kind": "tool_call_result",
            "payload": {"call_id": "c9", "error": "timeout", "status": "unmatched"}
        });
        let payload: StepPayload = serde_json::from_value(value).unwrap();
        match payload {
            StepPayload::ToolCallResult(result) => {
                assert_eq!(result.call_id, "c9");
                assert_eq!(result.error.as_deref(), Some("timeout"));
                assert_eq!(result.status, ToolResultStatus::Unmatched);
                assert!(result.output.is_none());
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[test]
    fn test_orphaned_result_has_no_output_or_error() {
        let result = ToolResult::orphaned("c2");
        assert_eq!(result.status, ToolResultStatus::Orphaned);
        assert!(!result.is_error());
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("output").is_none());
        assert_eq!(value["status"], "orphaned");
    }

    #[test]
    fn test_only_error_payload_is_terminal() {
        assert!(StepPayload::Error { message: "boom".into() }.is_terminal());
        assert!(!StepPayload::ModelCall { text: "hi".into() }.is_terminal());
    }
}
