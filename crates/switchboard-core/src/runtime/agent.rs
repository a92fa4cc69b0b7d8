//! AgentRuntime trait definition.
//!
//! Uses RPITIT for `check`, and `Pin<Box<dyn Stream>>` for `invoke` so the
//! stream stays object-safe for the `BoxAgentRuntime` wrapper.

use std::pin::Pin;

use futures_util::Stream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use switchboard_types::error::RuntimeError;
use switchboard_types::runtime::RawEvent;

/// Raw event stream returned by [`AgentRuntime::invoke`].
pub type RawEventStream = Pin<Box<dyn Stream<Item = Result<RawEvent, RuntimeError>> + Send + 'static>>;

/// Everything a runtime needs to execute one turn.
#[derive(Debug, Clone)]
pub struct RuntimeRequest {
    pub run_id: Uuid,
    pub thread_id: Uuid,
    pub agent_id: String,
    /// The user message for this turn.
    pub message: String,
    pub depth: u8,
    /// Cancelled when the run is cancelled. Only observed by runtimes that
    /// report `supports_cancellation`.
    pub cancellation: CancellationToken,
}

/// Trait for agent runtime backends (remote NDJSON endpoint, scripted replay).
///
/// Implementations live in switchboard-infra (`HttpAgentRuntime`) and in
/// this crate (`ScriptedRuntime`).
pub trait AgentRuntime: Send + Sync {
    /// Human-readable runtime name, for logs.
    fn name(&self) -> &str;

    /// Whether the runtime can stop a turn early when the request's
    /// cancellation token fires. Runtimes that cannot are drained to
    /// completion and cancellation is applied retroactively.
    fn supports_cancellation(&self) -> bool {
        false
    }

    /// Start a turn and return its raw event stream.
    ///
    /// The stream ends after the runtime's final event. A stream item of
    /// `Err` is runtime-fatal for the run.
    fn invoke(&self, request: RuntimeRequest) -> RawEventStream;

    /// Probe whether the runtime is reachable.
    fn check(&self) -> impl std::future::Future<Output = Result<(), RuntimeError>> + Send;
}
