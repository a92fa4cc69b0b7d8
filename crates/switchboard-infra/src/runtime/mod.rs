//! Agent runtime backends.
//!
//! `HttpAgentRuntime` streams NDJSON raw events from a remote endpoint;
//! `script` loads NDJSON files into core's `ScriptedRuntime`.

pub mod http;
pub mod ndjson;
pub mod script;

pub use http::HttpAgentRuntime;
pub use script::{ScriptError, load_script, scripted_runtime};
