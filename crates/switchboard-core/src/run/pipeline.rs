//! RunPipeline: executes one run, top-level or delegated.
//!
//! Invokes the agent's runtime, feeds raw events through the trace
//! extractor into the run's ledger, performs handoffs through the router,
//! and settles the run's terminal status. Handoff sub-runs re-enter the
//! same pipeline through [`SubRunExecutor`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use switchboard_types::error::{PersistenceError, RuntimeError};
use switchboard_types::run::{Run, RunStatus};
use switchboard_types::step::{Step, StepPayload, ToolResult, ToolResultStatus};
use switchboard_types::thread::Thread;

use super::lease::ThreadLease;
use super::scope::RunScope;
use crate::handoff::{DelegationError, DelegationOutcome, HandoffRouter, RunArena, SubRunExecutor};
use crate::ledger::{LedgerError, StepLedger};
use crate::persistence::{PersistenceGateway, WriteOp};
use crate::repository::RunStore;
use crate::runtime::{AgentRegistry, RuntimeRequest};
use crate::trace::{Extraction, HandoffRequest, TraceExtractor};

/// How the runtime loop of a run ended.
enum Ending {
    /// The runtime reported the run finished.
    Finished,
    /// The runtime stream ended without a finish event.
    StreamEnded,
    /// Cooperative cancellation stopped consumption.
    Cancelled,
    /// Runtime-fatal error; no error step has been appended yet.
    RuntimeFailed(String),
    /// The runtime reported an error; its error step is already appended.
    Reported(String),
    Persistence(PersistenceError),
}

impl From<LedgerError> for Ending {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Persistence(e) => Ending::Persistence(e),
            sealed @ LedgerError::Sealed(_) => Ending::Reported(sealed.to_string()),
        }
    }
}

pub struct RunPipeline<S: RunStore> {
    gateway: PersistenceGateway<S>,
    agents: Arc<AgentRegistry>,
    router: HandoffRouter<S>,
    arena: RunArena,
    routing_tool: String,
    /// Cancellation tokens of executing runs.
    active: DashMap<Uuid, CancellationToken>,
    /// Ledgers of executing runs, for live step reads.
    ledgers: DashMap<Uuid, Arc<StepLedger<S>>>,
}

impl<S: RunStore> RunPipeline<S> {
    pub fn new(
        gateway: PersistenceGateway<S>,
        agents: Arc<AgentRegistry>,
        max_handoff_depth: u8,
        routing_tool: impl Into<String>,
    ) -> Self {
        let arena = RunArena::new();
        Self {
            router: HandoffRouter::new(gateway.clone(), arena.clone(), max_handoff_depth),
            gateway,
            agents,
            arena,
            routing_tool: routing_tool.into(),
            active: DashMap::new(),
            ledgers: DashMap::new(),
        }
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Cancellation token of an executing run.
    pub fn cancellation_token(&self, run_id: &Uuid) -> Option<CancellationToken> {
        self.active.get(run_id).map(|t| t.clone())
    }

    pub fn is_executing(&self, run_id: &Uuid) -> bool {
        self.active.contains_key(run_id)
    }

    /// Steps of an executing run with `sequence > since`.
    pub async fn live_steps(&self, run_id: &Uuid, since: Option<u64>) -> Option<Vec<Step>> {
        let ledger = self.ledgers.get(run_id).map(|l| Arc::clone(&l))?;
        Some(ledger.steps_since(since).await)
    }

    /// Make `run` cancellable and open its write lane.
    ///
    /// Called before the run's task is spawned so a cancel issued right
    /// after start is not lost. Registering twice is harmless.
    pub fn register(&self, run: &Run, scope: &RunScope) {
        self.arena.register(run);
        self.active.insert(run.id, scope.cancellation.clone());
        self.gateway.open_lane(run.id);
    }

    fn deregister(&self, run_id: &Uuid) {
        self.ledgers.remove(run_id);
        self.active.remove(run_id);
        self.arena.remove(run_id);
    }

    /// Execute `run` to a terminal status.
    ///
    /// The run record must already exist in storage or be queued on the
    /// run's lane. `lease` is released once the terminal status is stored,
    /// before subscribers are told the run is done.
    pub async fn execute(&self, run: Run, scope: RunScope, lease: Option<ThreadLease>) -> RunStatus {
        let span = info_span!(
            "run",
            run_id = %run.id,
            thread_id = %run.thread_id,
            agent_id = %run.agent_id,
            depth = run.depth
        );
        self.drive(run, scope, lease).instrument(span).await
    }

    async fn drive(&self, mut run: Run, scope: RunScope, lease: Option<ThreadLease>) -> RunStatus {
        self.register(&run, &scope);

        let ledger = Arc::new(StepLedger::new(
            run.id,
            Arc::clone(&scope.hub),
            self.gateway.clone(),
        ));
        self.ledgers.insert(run.id, Arc::clone(&ledger));
        let mut extractor = TraceExtractor::new(self.routing_tool.as_str());

        let ending = self.consume(&mut run, &scope, &ledger, &mut extractor).await;
        let status = self.settle(&mut run, &scope, &ledger, &mut extractor, ending).await;

        match status {
            RunStatus::Failed => warn!(error = run.error.as_deref().unwrap_or(""), "run failed"),
            _ => info!(%status, "run finished"),
        }
        self.deregister(&run.id);
        drop(lease);
        ledger.finish(status).await;
        status
    }

    async fn consume(
        &self,
        run: &mut Run,
        scope: &RunScope,
        ledger: &StepLedger<S>,
        extractor: &mut TraceExtractor,
    ) -> Ending {
        if run.transition(RunStatus::Streaming) {
            if let Err(err) = self.gateway.submit(run.id, WriteOp::UpdateRun(run.clone())).await {
                return Ending::Persistence(err);
            }
        }

        let Some(runtime) = self.agents.runtime(&run.agent_id) else {
            return Ending::RuntimeFailed(RuntimeError::UnknownAgent(run.agent_id.clone()).to_string());
        };
        let cooperative = runtime.supports_cancellation();
        let mut events = runtime.invoke(RuntimeRequest {
            run_id: run.id,
            thread_id: run.thread_id,
            agent_id: run.agent_id.clone(),
            message: run.input.clone(),
            depth: run.depth,
            cancellation: scope.cancellation.clone(),
        });
        info!(runtime = runtime.name(), cooperative, "run streaming");

        loop {
            let next = if cooperative {
                tokio::select! {
                    biased;
                    _ = scope.cancellation.cancelled() => return Ending::Cancelled,
                    item = events.next() => item,
                }
            } else {
                events.next().await
            };

            let raw = match next {
                None => return Ending::StreamEnded,
                Some(Err(err)) => return Ending::RuntimeFailed(err.to_string()),
                Some(Ok(raw)) => raw,
            };

            for extraction in extractor.extract(&raw) {
                match extraction {
                    Extraction::Append(payload) => {
                        if let Err(err) = ledger.append(payload).await {
                            return err.into();
                        }
                    }
                    Extraction::Delegate(request) => {
                        if let Err(err) = self.delegate(run, scope, ledger, extractor, &request).await {
                            return err.into();
                        }
                    }
                    Extraction::Finished => return Ending::Finished,
                    Extraction::Failed { message } => return Ending::Reported(message),
                }
            }

            if let Some(err) = self.gateway.failure(&run.id) {
                return Ending::Persistence(err);
            }
        }
    }

    /// Run a requested handoff and close the routing call with its outcome.
    async fn delegate(
        &self,
        run: &Run,
        scope: &RunScope,
        ledger: &StepLedger<S>,
        extractor: &mut TraceExtractor,
        request: &HandoffRequest,
    ) -> Result<(), LedgerError> {
        let outcome = self
            .router
            .maybe_delegate(run, ledger, Some(request), &run.input, scope, self)
            .await;
        let latency_ms = extractor.close_call(&request.call_id);

        let result = match outcome {
            Ok(DelegationOutcome::None) => return Ok(()),
            Err(DelegationError::Ledger(err)) => return Err(err),
            Ok(DelegationOutcome::Delegated {
                child_run_id,
                status,
            }) => ToolResult {
                call_id: request.call_id.clone(),
                output: Some(json!({ "child_run_id": child_run_id, "status": status })),
                error: None,
                latency_ms,
                status: ToolResultStatus::Matched,
            },
            Err(DelegationError::Rejected(err)) => ToolResult {
                call_id: request.call_id.clone(),
                output: None,
                error: Some(err.to_string()),
                latency_ms,
                status: ToolResultStatus::Matched,
            },
        };
        ledger.append(StepPayload::ToolCallResult(result)).await?;
        Ok(())
    }

    /// Close out the trace and store the run's terminal status.
    ///
    /// When the terminal status cannot be stored, the run is reported
    /// failed and the failed record keeps being retried in the background.
    async fn settle(
        &self,
        run: &mut Run,
        scope: &RunScope,
        ledger: &StepLedger<S>,
        extractor: &mut TraceExtractor,
        ending: Ending,
    ) -> RunStatus {
        let cancel_requested = scope.cancellation.is_cancelled();
        let (mut status, mut error, needs_error_step) = match ending {
            Ending::Finished | Ending::StreamEnded if cancel_requested => {
                (RunStatus::Cancelled, None, false)
            }
            Ending::Finished | Ending::StreamEnded => (RunStatus::Completed, None, false),
            Ending::Cancelled => (RunStatus::Cancelled, None, false),
            Ending::Reported(message) => (RunStatus::Failed, Some(message), false),
            Ending::RuntimeFailed(message) => (RunStatus::Failed, Some(message), true),
            Ending::Persistence(err) => (
                RunStatus::Failed,
                Some(format!("persistence failure: {err}")),
                true,
            ),
        };

        for payload in extractor.finish() {
            if ledger.append(payload).await.is_err() {
                break;
            }
        }
        if needs_error_step {
            let message = error.clone().unwrap_or_default();
            if let Err(err) = ledger.append(StepPayload::Error { message }).await {
                warn!(error = %err, "error step was not persisted");
            }
        }

        if let Err(err) = self.gateway.finish(run.id).await {
            if status != RunStatus::Failed {
                let message = format!("persistence failure: {err}");
                // The lane is closed: this step reaches live subscribers only.
                let _ = ledger.append(StepPayload::Error { message: message.clone() }).await;
                status = RunStatus::Failed;
                error = Some(message);
            }
        }

        run.error = error;
        let mut terminal = run.clone();
        if !terminal.transition(status) {
            warn!(from = %run.status, to = %status, "illegal run transition");
        }
        if let Err(err) = self.gateway.write_now(WriteOp::UpdateRun(terminal.clone())).await {
            error!(error = %err, "could not persist final run status");
            if status != RunStatus::Failed {
                let message = format!("persistence failure: {err}");
                let _ = ledger.append(StepPayload::Error { message: message.clone() }).await;
                terminal = run.clone();
                terminal.error = Some(message);
                terminal.transition(RunStatus::Failed);
                status = RunStatus::Failed;
            }
            let _ = self.gateway.write_eventually(WriteOp::UpdateRun(terminal.clone()));
        }
        *run = terminal;
        status
    }
}

impl<S: RunStore> SubRunExecutor for RunPipeline<S> {
    fn has_agent(&self, agent_id: &str) -> bool {
        self.agents.contains(agent_id)
    }

    fn execute_sub_run(
        &self,
        thread: Thread,
        run: Run,
        scope: RunScope,
    ) -> Pin<Box<dyn Future<Output = RunStatus> + Send + '_>> {
        Box::pin(async move {
            self.register(&run, &scope);
            let creates = [WriteOp::CreateThread(thread), WriteOp::CreateRun(run.clone())];
            for op in creates {
                if let Err(err) = self.gateway.submit(run.id, op).await {
                    warn!(run_id = %run.id, error = %err, "could not queue sub-run records");
                    break;
                }
            }
            self.execute(run, scope, None).await
        })
    }
}
