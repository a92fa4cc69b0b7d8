//! Agent runtime port.
//!
//! An agent runtime executes one agent turn and yields raw execution events.
//! Runtimes are addressed by agent id through the [`AgentRegistry`].

pub mod agent;
pub mod box_runtime;
pub mod registry;
pub mod scripted;

pub use agent::{AgentRuntime, RawEventStream, RuntimeRequest};
pub use box_runtime::BoxAgentRuntime;
pub use registry::AgentRegistry;
pub use scripted::ScriptedRuntime;
