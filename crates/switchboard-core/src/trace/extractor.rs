//! Stateful trace extractor.
//!
//! Interprets the loosely-typed events of an agent runtime and turns them
//! into [`StepPayload`]s plus control signals. Interpretation is a table of
//! rules keyed by event name; supporting a new upstream event shape means
//! adding a rule, never widening `StepPayload`.
//!
//! The extractor also tracks open tool calls so every result can be matched
//! to its call, and every call still open at termination gets an orphaned
//! result.

use std::time::Instant;

use serde_json::Value;
use tracing::debug;

use switchboard_types::runtime::RawEvent;
use switchboard_types::step::{StepPayload, ToolCall, ToolResult, ToolResultStatus};

/// A request, made through the routing tool, to hand the turn to another agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    /// Call id of the routing tool invocation.
    pub call_id: String,
    pub target_agent_id: String,
    pub reason: String,
}

/// One output of [`TraceExtractor::extract`].
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Append this payload to the run's ledger.
    Append(StepPayload),
    /// The runtime asked to delegate to another agent.
    Delegate(HandoffRequest),
    /// The runtime reported the run finished normally.
    Finished,
    /// The runtime reported a fatal error; the error step was already
    /// emitted as an `Append`.
    Failed { message: String },
}

#[derive(Debug)]
struct OpenCall {
    call_id: String,
    opened_at: Instant,
}

type Rule = fn(&mut TraceExtractor, &RawEvent) -> Vec<Extraction>;

/// Extraction rules keyed by raw event name.
const RULES: &[(&str, Rule)] = &[
    ("token", TraceExtractor::on_token),
    ("on_chat_model_stream", TraceExtractor::on_token),
    ("on_llm_stream", TraceExtractor::on_token),
    ("tool_start", TraceExtractor::on_tool_start),
    ("on_tool_start", TraceExtractor::on_tool_start),
    ("tool_end", TraceExtractor::on_tool_end),
    ("on_tool_end", TraceExtractor::on_tool_end),
    ("tool_error", TraceExtractor::on_tool_error),
    ("on_tool_error", TraceExtractor::on_tool_error),
    ("run_end", TraceExtractor::on_run_end),
    ("on_chain_end", TraceExtractor::on_run_end),
    ("error", TraceExtractor::on_error),
    ("on_chain_error", TraceExtractor::on_error),
];

/// Per-run parser over raw runtime events.
#[derive(Debug)]
pub struct TraceExtractor {
    routing_tool: String,
    open_calls: Vec<OpenCall>,
    generated_ids: u64,
    done: bool,
}

impl TraceExtractor {
    pub fn new(routing_tool: impl Into<String>) -> Self {
        Self {
            routing_tool: routing_tool.into(),
            open_calls: Vec::new(),
            generated_ids: 0,
            done: false,
        }
    }

    /// Interpret one raw event.
    ///
    /// Events after the run finished or failed are ignored.
    pub fn extract(&mut self, raw: &RawEvent) -> Vec<Extraction> {
        if self.done {
            debug!(event = %raw.event, "ignoring raw event after run end");
            return Vec::new();
        }
        match RULES.iter().find(|(name, _)| *name == raw.event) {
            Some((_, rule)) => rule(self, raw),
            None => {
                debug!(event = %raw.event, "ignoring unknown raw event");
                Vec::new()
            }
        }
    }

    /// Orphan every call that is still open.
    ///
    /// Used when the runtime stream ends without a run-finished event, on
    /// cancellation, and on runtime failure.
    pub fn finish(&mut self) -> Vec<StepPayload> {
        self.done = true;
        self.open_calls
            .drain(..)
            .map(|call| StepPayload::ToolCallResult(ToolResult::orphaned(call.call_id)))
            .collect()
    }

    /// Close an open call without a runtime event (the engine answered it,
    /// as for a routing call). Returns the call's latency, or `None` if the
    /// call was not open.
    pub fn close_call(&mut self, call_id: &str) -> Option<u64> {
        let idx = self.open_calls.iter().position(|c| c.call_id == call_id)?;
        let call = self.open_calls.remove(idx);
        Some(elapsed_ms(call.opened_at))
    }

    pub fn open_call_count(&self) -> usize {
        self.open_calls.len()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    fn on_token(&mut self, raw: &RawEvent) -> Vec<Extraction> {
        match text_delta(&raw.data) {
            Some(text) if !text.is_empty() => {
                vec![Extraction::Append(StepPayload::ModelCall { text })]
            }
            _ => Vec::new(),
        }
    }

    fn on_tool_start(&mut self, raw: &RawEvent) -> Vec<Extraction> {
        let call_id = match call_id_of(raw) {
            Some(id) => id,
            None => {
                self.generated_ids += 1;
                format!("call-{}", self.generated_ids)
            }
        };
        if self.open_calls.iter().any(|c| c.call_id == call_id) {
            debug!(call_id = %call_id, "ignoring duplicate tool start");
            return Vec::new();
        }

        let tool_name = raw
            .name
            .clone()
            .or_else(|| str_field(&raw.data, &["name", "tool_name", "tool"]))
            .unwrap_or_else(|| "unknown".to_string());
        let arguments = tool_arguments(&raw.data);

        self.open_calls.push(OpenCall {
            call_id: call_id.clone(),
            opened_at: Instant::now(),
        });

        let mut out = Vec::with_capacity(2);
        let delegate = (tool_name == self.routing_tool)
            .then(|| routing_target(&arguments))
            .flatten()
            .map(|(target_agent_id, reason)| HandoffRequest {
                call_id: call_id.clone(),
                target_agent_id,
                reason,
            });

        out.push(Extraction::Append(StepPayload::ToolCall(ToolCall {
            call_id,
            tool_name,
            arguments,
        })));
        if let Some(request) = delegate {
            out.push(Extraction::Delegate(request));
        }
        out
    }

    fn on_tool_end(&mut self, raw: &RawEvent) -> Vec<Extraction> {
        let output = raw.data.get("output").cloned().unwrap_or(Value::Null);
        vec![Extraction::Append(StepPayload::ToolCallResult(
            self.resolve(raw, Some(output), None),
        ))]
    }

    fn on_tool_error(&mut self, raw: &RawEvent) -> Vec<Extraction> {
        let error = error_message(&raw.data).unwrap_or_else(|| "tool failed".to_string());
        vec![Extraction::Append(StepPayload::ToolCallResult(
            self.resolve(raw, None, Some(error)),
        ))]
    }

    fn on_run_end(&mut self, raw: &RawEvent) -> Vec<Extraction> {
        if !raw.parent_ids.is_empty() {
            return Vec::new();
        }
        let mut out: Vec<Extraction> = self.finish().into_iter().map(Extraction::Append).collect();
        out.push(Extraction::Finished);
        out
    }

    fn on_error(&mut self, raw: &RawEvent) -> Vec<Extraction> {
        if raw.event == "on_chain_error" && !raw.parent_ids.is_empty() {
            return Vec::new();
        }
        let message =
            error_message(&raw.data).unwrap_or_else(|| "runtime reported an error".to_string());
        let mut out: Vec<Extraction> = self.finish().into_iter().map(Extraction::Append).collect();
        out.push(Extraction::Append(StepPayload::Error {
            message: message.clone(),
        }));
        out.push(Extraction::Failed { message });
        out
    }

    /// Build a result for a tool end/error event, matching it to an open call.
    fn resolve(
        &mut self,
        raw: &RawEvent,
        output: Option<Value>,
        error: Option<String>,
    ) -> ToolResult {
        let call_id = call_id_of(raw).unwrap_or_default();
        match self.close_call(&call_id) {
            Some(latency_ms) => ToolResult {
                call_id,
                output,
                error,
                latency_ms: Some(latency_ms),
                status: ToolResultStatus::Matched,
            },
            None => {
                debug!(call_id = %call_id, "tool result without an open call");
                ToolResult {
                    call_id,
                    output,
                    error,
                    latency_ms: None,
                    status: ToolResultStatus::Unmatched,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn call_id_of(raw: &RawEvent) -> Option<String> {
    raw.run_id
        .clone()
        .or_else(|| str_field(&raw.data, &["tool_call_id", "call_id", "id"]))
        .filter(|id| !id.is_empty())
}

fn str_field(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| data.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// Text of a token event: `text`, `chunk`, `chunk.content`, or `content`,
/// where content may be a string or a list of `{type: "text", text}` parts.
fn text_delta(data: &Value) -> Option<String> {
    if let Some(text) = data.as_str() {
        return Some(text.to_string());
    }
    let candidate = data
        .get("text")
        .or_else(|| data.get("chunk").and_then(|c| c.get("content").or(Some(c))))
        .or_else(|| data.get("content"))?;
    content_text(candidate)
}

fn content_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.as_str()),
                    Value::Object(_) => {
                        let is_text = part
                            .get("type")
                            .and_then(Value::as_str)
                            .is_none_or(|t| t == "text");
                        if is_text { part.get("text").and_then(Value::as_str) } else { None }
                    }
                    _ => None,
                })
                .collect();
            Some(text)
        }
        _ => None,
    }
}

/// Tool arguments: `input`, `arguments`, or `args`. String arguments that
/// hold JSON are parsed.
fn tool_arguments(data: &Value) -> Value {
    let raw = data
        .get("input")
        .or_else(|| data.get("arguments"))
        .or_else(|| data.get("args"))
        .cloned()
        .unwrap_or(Value::Null);
    if let Value::String(s) = &raw {
        if let Ok(parsed) = serde_json::from_str(s) {
            return parsed;
        }
    }
    raw
}

fn routing_target(arguments: &Value) -> Option<(String, String)> {
    let target = str_field(arguments, &["agent", "agent_id", "target"])?;
    let target = target.trim().to_string();
    if target.is_empty() {
        return None;
    }
    let reason = str_field(arguments, &["reason"]).unwrap_or_default();
    Some((target, reason))
}

fn error_message(data: &Value) -> Option<String> {
    if let Some(s) = data.as_str() {
        return Some(s.to_string());
    }
    let value = data.get("message").or_else(|| data.get("error"))?;
    Some(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> TraceExtractor {
        TraceExtractor::new("transfer_to_agent")
    }

    fn appended(extractions: &[Extraction]) -> Vec<&StepPayload> {
        extractions
            .iter()
            .filter_map(|e| match e {
                Extraction::Append(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_token_aliases() {
        let mut ex = extractor();
        let out = ex.extract(&RawEvent::token("Hel"));
        assert_eq!(
            out,
            vec![Extraction::Append(StepPayload::ModelCall { text: "Hel".into() })]
        );

        let lc = RawEvent::new("on_chat_model_stream", json!({"chunk": {"content": "lo"}}));
        assert_eq!(
            ex.extract(&lc),
            vec![Extraction::Append(StepPayload::ModelCall { text: "lo".into() })]
        );
    }

    #[test]
    fn test_token_with_content_parts() {
        let mut ex = extractor();
        let raw = RawEvent::new(
            "on_chat_model_stream",
            json!({"chunk": {"content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "world"}
            ]}}),
        );
        let out = ex.extract(&raw);
        assert_eq!(
            out,
            vec![Extraction::Append(StepPayload::ModelCall { text: "Hello world".into() })]
        );
    }

    #[test]
    fn test_empty_delta_dropped() {
        let mut ex = extractor();
        assert!(ex.extract(&RawEvent::token("")).is_empty());
        let raw = RawEvent::new("on_chat_model_stream", json!({"chunk": {"content": []}}));
        assert!(ex.extract(&raw).is_empty());
    }

    #[test]
    fn test_tool_call_then_matched_result() {
        let mut ex = extractor();
        let out = ex.extract(&RawEvent::tool_start("c1", "search_docs", json!({"query": "vpn issue"})));
        match appended(&out).as_slice() {
            [StepPayload::ToolCall(call)] => {
                assert_eq!(call.call_id, "c1");
                assert_eq!(call.tool_name, "search_docs");
                assert_eq!(call.arguments["query"], "vpn issue");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(ex.open_call_count(), 1);

        let out = ex.extract(&RawEvent::tool_end("c1", json!(["doc-1"])));
        match appended(&out).as_slice() {
            [StepPayload::ToolCallResult(result)] => {
                assert_eq!(result.status, ToolResultStatus::Matched);
                assert!(result.latency_ms.is_some());
                assert_eq!(result.output, Some(json!(["doc-1"])));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(ex.open_call_count(), 0);
    }

    #[test]
    fn test_langchain_tool_events() {
        let mut ex = extractor();
        let start = RawEvent::new("on_tool_start", json!({"input": "{\"query\": \"vpn\"}"}))
            .with_name("search_docs")
            .with_run_id("lc-1");
        let out = ex.extract(&start);
        match appended(&out).as_slice() {
            [StepPayload::ToolCall(call)] => assert_eq!(call.arguments["query"], "vpn"),
            other => panic!("unexpected: {other:?}"),
        }
        let end = RawEvent::new("on_tool_end", json!({"output": "found"})).with_run_id("lc-1");
        let out = ex.extract(&end);
        assert!(matches!(
            appended(&out).as_slice(),
            [StepPayload::ToolCallResult(ToolResult { status: ToolResultStatus::Matched, .. })]
        ));
    }

    #[test]
    fn test_tool_error_is_data() {
        let mut ex = extractor();
        ex.extract(&RawEvent::tool_start("c1", "query_db", json!({})));
        let out = ex.extract(&RawEvent::tool_error("c1", "timeout"));
        assert_eq!(out.len(), 1);
        match appended(&out).as_slice() {
            [StepPayload::ToolCallResult(result)] => {
                assert_eq!(result.error.as_deref(), Some("timeout"));
                assert_eq!(result.status, ToolResultStatus::Matched);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!out.iter().any(|e| matches!(e, Extraction::Failed { .. })));
    }

    #[test]
    fn test_result_without_call_is_unmatched() {
        let mut ex = extractor();
        let out = ex.extract(&RawEvent::tool_end("ghost", json!(1)));
        match appended(&out).as_slice() {
            [StepPayload::ToolCallResult(result)] => {
                assert_eq!(result.call_id, "ghost");
                assert_eq!(result.status, ToolResultStatus::Unmatched);
                assert!(result.latency_ms.is_none());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_run_end_orphans_open_calls() {
        let mut ex = extractor();
        ex.extract(&RawEvent::tool_start("c1", "search_docs", json!({})));
        ex.extract(&RawEvent::tool_start("c2", "query_db", json!({})));
        let out = ex.extract(&RawEvent::run_end());
        assert_eq!(out.len(), 3);
        assert_eq!(
            out[0],
            Extraction::Append(StepPayload::ToolCallResult(ToolResult::orphaned("c1")))
        );
        assert_eq!(
            out[1],
            Extraction::Append(StepPayload::ToolCallResult(ToolResult::orphaned("c2")))
        );
        assert_eq!(out[2], Extraction::Finished);
        assert!(ex.is_done());
    }

    #[test]
    fn test_nested_chain_end_is_ignored() {
        let mut ex = extractor();
        let nested = RawEvent::new("on_chain_end", json!({})).with_parent("root");
        assert!(ex.extract(&nested).is_empty());
        assert!(!ex.is_done());
        let top = RawEvent::new("on_chain_end", json!({}));
        assert_eq!(ex.extract(&top), vec![Extraction::Finished]);
    }

    #[test]
    fn test_error_appends_error_step_and_fails() {
        let mut ex = extractor();
        ex.extract(&RawEvent::tool_start("c1", "search_docs", json!({})));
        let out = ex.extract(&RawEvent::error("model overloaded"));
        assert_eq!(out.len(), 3);
        assert!(matches!(
            &out[0],
            Extraction::Append(StepPayload::ToolCallResult(r)) if r.status == ToolResultStatus::Orphaned
        ));
        assert_eq!(
            out[1],
            Extraction::Append(StepPayload::Error { message: "model overloaded".into() })
        );
        assert_eq!(out[2], Extraction::Failed { message: "model overloaded".into() });
    }

    #[test]
    fn test_events_after_end_ignored() {
        let mut ex = extractor();
        ex.extract(&RawEvent::run_end());
        assert!(ex.extract(&RawEvent::token("late")).is_empty());
    }

    #[test]
    fn test_unknown_event_ignored() {
        let mut ex = extractor();
        assert!(ex.extract(&RawEvent::new("on_retriever_start", json!({}))).is_empty());
    }

    #[test]
    fn test_routing_tool_yields_delegate() {
        let mut ex = extractor();
        let raw = RawEvent::tool_start(
            "r1",
            "transfer_to_agent",
            json!({"agent": "sql-agent", "reason": "needs a query"}),
        );
        let out = ex.extract(&raw);
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Extraction::Append(StepPayload::ToolCall(c)) if c.call_id == "r1"));
        assert_eq!(
            out[1],
            Extraction::Delegate(HandoffRequest {
                call_id: "r1".into(),
                target_agent_id: "sql-agent".into(),
                reason: "needs a query".into(),
            })
        );
    }

    #[test]
    fn test_routing_tool_without_target_is_plain_call() {
        let mut ex = extractor();
        let out = ex.extract(&RawEvent::tool_start("r1", "transfer_to_agent", json!({})));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_close_call_reports_latency_once() {
        let mut ex = extractor();
        ex.extract(&RawEvent::tool_start("r1", "transfer_to_agent", json!({"agent_id": "x"})));
        assert!(ex.close_call("r1").is_some());
        assert!(ex.close_call("r1").is_none());
    }

    #[test]
    fn test_missing_call_id_is_generated() {
        let mut ex = extractor();
        let raw = RawEvent::new("tool_start", json!({"name": "lookup", "args": {"k": 1}}));
        let out = ex.extract(&raw);
        match appended(&out).as_slice() {
            [StepPayload::ToolCall(call)] => {
                assert_eq!(call.call_id, "call-1");
                assert_eq!(call.tool_name, "lookup");
                assert_eq!(call.arguments["k"], 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
