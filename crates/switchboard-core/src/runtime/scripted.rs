//! Scripted agent runtime.
//!
//! Replays a fixed list of raw events, optionally with a delay between
//! them. Used for tests, demos, and `script =` agents in configuration.

use std::time::Duration;

use switchboard_types::error::RuntimeError;
use switchboard_types::runtime::RawEvent;

use super::agent::{AgentRuntime, RawEventStream, RuntimeRequest};

#[derive(Debug, Clone)]
pub struct ScriptedRuntime {
    name: String,
    script: Vec<Result<RawEvent, RuntimeError>>,
    delay: Option<Duration>,
    cooperative: bool,
}

impl ScriptedRuntime {
    pub fn new(name: impl Into<String>, events: Vec<RawEvent>) -> Self {
        Self {
            name: name.into(),
            script: events.into_iter().map(Ok).collect(),
            delay: None,
            cooperative: false,
        }
    }

    /// Sleep this long before yielding each event.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// End the script with a stream-level failure.
    pub fn failing_with(mut self, error: RuntimeError) -> Self {
        self.script.push(Err(error));
        self
    }

    /// Stop yielding events once the request is cancelled.
    pub fn cooperative(mut self) -> Self {
        self.cooperative = true;
        self
    }
}

impl AgentRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_cancellation(&self) -> bool {
        self.cooperative
    }

    fn invoke(&self, request: RuntimeRequest) -> RawEventStream {
        let script = self.script.clone();
        let delay = self.delay;
        let cooperative = self.cooperative;

        Box::pin(async_stream::stream! {
            for item in script {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if cooperative && request.cancellation.is_cancelled() {
                    break;
                }
                yield item;
            }
        })
    }

    async fn check(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}
