//! Execution scope shared by a run and its handoff sub-runs.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ledger::TraceHub;

/// The state that flows down a delegation tree.
///
/// The hub is shared by every run in the tree. The cancellation token forms
/// a tree: cancelling a parent cancels all children, but not vice versa.
#[derive(Debug, Clone)]
pub struct RunScope {
    pub hub: Arc<TraceHub>,
    pub cancellation: CancellationToken,
}

impl RunScope {
    /// Scope of a top-level run.
    pub fn root(hub: Arc<TraceHub>) -> Self {
        Self {
            hub,
            cancellation: CancellationToken::new(),
        }
    }

    /// Scope for a sub-run: same hub, child cancellation token.
    pub fn child(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            cancellation: self.cancellation.child_token(),
        }
    }
}
