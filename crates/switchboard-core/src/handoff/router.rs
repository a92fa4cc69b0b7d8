//! HandoffRouter: bounded-depth, cycle-free delegation.
//!
//! The runtime decides *whether* to delegate by calling the routing tool;
//! the router only decides whether the delegation is allowed and, if so,
//! runs the target agent as a child run through the same pipeline.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use switchboard_types::error::HandoffError;
use switchboard_types::run::{Run, RunStatus};
use switchboard_types::step::{HandoffRecord, StepPayload};
use switchboard_types::thread::{Thread, derive_title};

use super::arena::{RunArena, RunLink};
use crate::ledger::{LedgerError, StepLedger};
use crate::persistence::PersistenceGateway;
use crate::repository::RunStore;
use crate::run::RunScope;
use crate::trace::HandoffRequest;

/// Result of a handoff attempt that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationOutcome {
    /// No handoff was requested.
    None,
    /// The child run executed to a terminal status.
    Delegated { child_run_id: Uuid, status: RunStatus },
}

/// Why a requested handoff did not run.
#[derive(Debug, Error)]
pub enum DelegationError {
    /// The handoff is not allowed. The parent run carries on.
    #[error(transparent)]
    Rejected(#[from] HandoffError),

    /// The parent's `handoff` step could not be recorded, so no sub-run was
    /// started.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Executes child runs for the router.
///
/// Implemented by the run pipeline. The boxed future breaks the type-level
/// recursion between a run and its sub-runs.
pub trait SubRunExecutor: Send + Sync {
    fn has_agent(&self, agent_id: &str) -> bool;

    fn execute_sub_run(
        &self,
        thread: Thread,
        run: Run,
        scope: RunScope,
    ) -> Pin<Box<dyn Future<Output = RunStatus> + Send + '_>>;
}

pub struct HandoffRouter<S: RunStore> {
    gateway: PersistenceGateway<S>,
    arena: RunArena,
    max_depth: u8,
}

impl<S: RunStore> HandoffRouter<S> {
    pub fn new(gateway: PersistenceGateway<S>, arena: RunArena, max_depth: u8) -> Self {
        Self {
            gateway,
            arena,
            max_depth,
        }
    }

    /// Agents from the root of the delegation tree down to `run`.
    ///
    /// The walk is bounded by `max_depth + 1` hops, so a corrupted parent
    /// link cannot loop forever.
    pub async fn agent_chain(&self, run: &Run) -> Vec<String> {
        let mut chain = vec![run.agent_id.clone()];
        let mut next = run.parent_run_id;
        let mut hops = 0usize;

        while let Some(run_id) = next {
            if hops > usize::from(self.max_depth) {
                warn!(%run_id, "ancestor walk exceeded depth bound");
                break;
            }
            hops += 1;

            let link = match self.arena.get(&run_id) {
                Some(link) => Some(link),
                None => match self.gateway.get_run(&run_id).await {
                    Ok(found) => found.as_ref().map(RunLink::from),
                    Err(err) => {
                        warn!(%run_id, error = %err, "could not load ancestor run");
                        None
                    }
                },
            };
            match link {
                Some(link) => {
                    chain.push(link.agent_id);
                    next = link.parent_run_id;
                }
                None => break,
            }
        }

        chain.reverse();
        chain
    }

    /// Validate a handoff from `parent` to `target`.
    ///
    /// Checked in order: depth, cycle (including target == source), then
    /// whether the target agent exists.
    pub async fn check(
        &self,
        parent: &Run,
        target: &str,
        executor: &dyn SubRunExecutor,
    ) -> Result<(), HandoffError> {
        if parent.depth >= self.max_depth {
            return Err(HandoffError::DepthExceeded {
                depth: parent.depth,
                max_depth: self.max_depth,
            });
        }

        let chain = self.agent_chain(parent).await;
        if chain.iter().any(|agent| agent == target) {
            return Err(HandoffError::Cycle {
                target: target.to_string(),
                chain,
            });
        }

        if !executor.has_agent(target) {
            return Err(HandoffError::UnknownAgent(target.to_string()));
        }
        Ok(())
    }

    /// Perform the requested handoff, if any and if allowed.
    ///
    /// On success the parent's ledger gets a `handoff` step referencing the
    /// child run, then the child executes to completion. The caller closes
    /// the routing call with the outcome. The child is not started when the
    /// `handoff` step cannot be appended.
    pub async fn maybe_delegate(
        &self,
        parent: &Run,
        ledger: &StepLedger<S>,
        request: Option<&HandoffRequest>,
        message: &str,
        scope: &RunScope,
        executor: &dyn SubRunExecutor,
    ) -> Result<DelegationOutcome, DelegationError> {
        let Some(request) = request else {
            return Ok(DelegationOutcome::None);
        };
        let target = request.target_agent_id.as_str();

        if let Err(err) = self.check(parent, target, executor).await {
            info!(
                run_id = %parent.id,
                source = %parent.agent_id,
                target_agent = target,
                error = %err,
                "handoff rejected"
            );
            return Err(err.into());
        }

        let thread = Thread::new(target, derive_title(message));
        let child = Run::child_of(parent, thread.id, target, message);
        let child_run_id = child.id;

        let record = HandoffRecord {
            source_agent_id: parent.agent_id.clone(),
            target_agent_id: target.to_string(),
            child_run_id,
            reason: request.reason.clone(),
        };
        if let Err(err) = ledger.append(StepPayload::Handoff(record)).await {
            warn!(run_id = %parent.id, %child_run_id, error = %err, "could not record handoff step");
            return Err(err.into());
        }

        info!(
            run_id = %parent.id,
            %child_run_id,
            source = %parent.agent_id,
            target_agent = target,
            depth = child.depth,
            "delegating to sub-agent"
        );
        let status = executor.execute_sub_run(thread, child, scope.child()).await;
        Ok(DelegationOutcome::Delegated {
            child_run_id,
            status,
        })
    }
}
