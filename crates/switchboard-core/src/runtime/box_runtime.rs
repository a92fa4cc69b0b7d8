//! BoxAgentRuntime -- object-safe dynamic dispatch wrapper for AgentRuntime.
//!
//! 1. Define an object-safe `AgentRuntimeDyn` trait with boxed futures
//! 2. Blanket-impl `AgentRuntimeDyn` for all `T: AgentRuntime`
//! 3. `BoxAgentRuntime` wraps `Arc<dyn AgentRuntimeDyn>` and delegates

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use switchboard_types::error::RuntimeError;

use super::agent::{AgentRuntime, RawEventStream, RuntimeRequest};

/// Object-safe version of [`AgentRuntime`] with boxed futures.
pub trait AgentRuntimeDyn: Send + Sync {
    fn name(&self) -> &str;

    fn supports_cancellation(&self) -> bool;

    fn invoke_boxed(&self, request: RuntimeRequest) -> RawEventStream;

    fn check_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send + '_>>;
}

impl<T: AgentRuntime> AgentRuntimeDyn for T {
    fn name(&self) -> &str {
        AgentRuntime::name(self)
    }

    fn supports_cancellation(&self) -> bool {
        AgentRuntime::supports_cancellation(self)
    }

    fn invoke_boxed(&self, request: RuntimeRequest) -> RawEventStream {
        self.invoke(request)
    }

    fn check_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), RuntimeError>> + Send + '_>> {
        Box::pin(self.check())
    }
}

/// Shared, type-erased agent runtime.
///
/// Cloning is cheap: runs of the same agent share one runtime instance.
#[derive(Clone)]
pub struct BoxAgentRuntime {
    inner: Arc<dyn AgentRuntimeDyn>,
}

impl BoxAgentRuntime {
    pub fn new<T: AgentRuntime + 'static>(runtime: T) -> Self {
        Self {
            inner: Arc::new(runtime),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn supports_cancellation(&self) -> bool {
        self.inner.supports_cancellation()
    }

    pub fn invoke(&self, request: RuntimeRequest) -> RawEventStream {
        self.inner.invoke_boxed(request)
    }

    pub async fn check(&self) -> Result<(), RuntimeError> {
        self.inner.check_boxed().await
    }
}

impl std::fmt::Debug for BoxAgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxAgentRuntime")
            .field("name", &self.name())
            .finish()
    }
}
