//! Raw agent-runtime event shape.
//!
//! Agent runtimes emit loosely-typed execution events (LangChain-style
//! `astream_events`: an event name, an optional component name, a runtime
//! run id, and an arbitrary JSON `data` object). `RawEvent` carries them
//! untouched; the trace extractor is the only place that interprets them.

use serde::{Deserialize, Serialize};

/// A single loosely-typed event as produced by an agent runtime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event name, e.g. `on_chat_model_stream`, `on_tool_start`, `token`.
    pub event: String,
    /// Component that produced the event (tool name for tool events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Runtime-side id of the component invocation (used as tool call id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Ids of enclosing runtime components; empty for top-level events.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_ids: Vec<String>,
    /// Event-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RawEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_ids.push(parent_id.into());
        self
    }

    /// Shorthand for a text token event.
    pub fn token(text: impl Into<String>) -> Self {
        Self::new("token", serde_json::json!({ "text": text.into() }))
    }

    /// Shorthand for a tool invocation request.
    pub fn tool_start(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::new("tool_start", serde_json::json!({ "input": input }))
            .with_name(tool_name)
            .with_run_id(call_id)
    }

    /// Shorthand for a successful tool result.
    pub fn tool_end(call_id: impl Into<String>, output: serde_json::Value) -> Self {
        Self::new("tool_end", serde_json::json!({ "output": output })).with_run_id(call_id)
    }

    /// Shorthand for a failed tool invocation.
    pub fn tool_error(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new("tool_error", serde_json::json!({ "error": error.into() }))
            .with_run_id(call_id)
    }

    /// Shorthand for the top-level run-finished event.
    pub fn run_end() -> Self {
        Self::new("run_end", serde_json::Value::Null)
    }

    /// Shorthand for a runtime-reported fatal error.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", serde_json::json!({ "message": message.into() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_langchain_shape() {
        let line = r#"{"event":"on_tool_start","name":"search_docs","run_id":"abc","parent_ids":["root"],"data":{"input":{"query":"vpn issue"}}}"#;
        let raw: RawEvent = serde_json::from_str(line).unwrap();
        assert_eq!(raw.event, "on_tool_start");
        assert_eq!(raw.name.as_deref(), Some("search_docs"));
        assert_eq!(raw.run_id.as_deref(), Some("abc"));
        assert_eq!(raw.parent_ids, vec!["root".to_string()]);
        assert_eq!(raw.data["input"]["query"], "vpn issue");
    }

    #[test]
    fn test_missing_fields_default() {
        let raw: RawEvent = serde_json::from_str(r#"{"event":"run_end"}"#).unwrap();
        assert!(raw.name.is_none());
        assert!(raw.parent_ids.is_empty());
        assert!(raw.data.is_null());
    }

    #[test]
    fn test_builders() {
        let raw = RawEvent::tool_start("c1", "search_docs", json!({"query": "vpn issue"}));
        assert_eq!(raw.event, "tool_start");
        assert_eq!(raw.run_id.as_deref(), Some("c1"));
        assert_eq!(raw.data["input"]["query"], "vpn issue");

        let token = RawEvent::token("Hi");
        assert_eq!(token.data["text"], "Hi");
    }
}
