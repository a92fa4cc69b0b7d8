//! RunCoordinator: the entry point for starting and observing runs.
//!
//! Owns the per-thread busy leases and the run pipeline. `start_run`
//! validates the thread, takes its lease, records the run, and spawns the
//! pipeline on its own task: a caller that stops reading the stream never
//! aborts the run.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use switchboard_types::config::EngineConfig;
use switchboard_types::error::RunError;
use switchboard_types::event::RunEvent;
use switchboard_types::run::{Run, RunStatus, RunWithSteps};
use switchboard_types::step::{Step, StepPayload};
use switchboard_types::thread::{ThreadStatus, derive_title};

use super::lease::ThreadLeases;
use super::pipeline::RunPipeline;
use super::scope::RunScope;
use crate::ledger::TraceHub;
use crate::persistence::{PersistenceGateway, WriteOp};
use crate::repository::RunStore;
use crate::runtime::AgentRegistry;
use crate::stream::{EventStreamer, RunTrace};

/// Error message recorded on runs found unfinished at startup.
pub const INTERRUPTED_MESSAGE: &str = "interrupted: the process stopped before the run finished";

/// A freshly started run.
pub struct StartedRun {
    /// The run as recorded (status `pending`).
    pub run: Run,
    /// Live events for the run and its sub-runs.
    pub stream: EventStreamer,
    /// Resolves to the run's terminal status. Dropping it does not stop
    /// the run.
    pub completion: JoinHandle<RunStatus>,
}

pub struct RunCoordinator<S: RunStore> {
    pipeline: Arc<RunPipeline<S>>,
    gateway: PersistenceGateway<S>,
    leases: ThreadLeases,
    subscriber_buffer: usize,
    max_handoff_depth: u8,
}

impl<S: RunStore> RunCoordinator<S> {
    pub fn new(
        gateway: PersistenceGateway<S>,
        agents: Arc<AgentRegistry>,
        config: &EngineConfig,
    ) -> Self {
        let pipeline = RunPipeline::new(
            gateway.clone(),
            agents,
            config.max_handoff_depth,
            config.routing_tool.clone(),
        );
        Self {
            pipeline: Arc::new(pipeline),
            gateway,
            leases: ThreadLeases::new(),
            subscriber_buffer: config.stream.subscriber_buffer,
            max_handoff_depth: config.max_handoff_depth,
        }
    }

    pub fn gateway(&self) -> &PersistenceGateway<S> {
        &self.gateway
    }

    pub fn agents(&self) -> &AgentRegistry {
        self.pipeline.agents()
    }

    /// Run currently holding the thread, if any.
    pub fn active_run(&self, thread_id: &Uuid) -> Option<Uuid> {
        self.leases.holder(thread_id)
    }

    /// Start a run for `message` on the thread.
    pub async fn start_run(&self, thread_id: Uuid, message: &str) -> Result<StartedRun, RunError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(RunError::Validation("message must not be empty".to_string()));
        }

        let mut thread = self
            .gateway
            .get_thread(&thread_id)
            .await?
            .ok_or(RunError::ThreadNotFound(thread_id))?;
        match thread.status {
            ThreadStatus::Active => {}
            ThreadStatus::Archived => return Err(RunError::ThreadArchived(thread_id)),
            ThreadStatus::Deleted => return Err(RunError::ThreadNotFound(thread_id)),
        }
        if !self.pipeline.agents().contains(&thread.agent_id) {
            return Err(RunError::UnknownAgent(thread.agent_id.clone()));
        }

        let run = Run::new(thread.id, thread.agent_id.as_str(), message);
        let lease = self
            .leases
            .acquire(thread.id, run.id)
            .map_err(|active_run_id| RunError::ThreadBusy {
                thread_id,
                active_run_id,
            })?;

        if thread.title.is_none() {
            thread.title = derive_title(message);
        }
        thread.updated_at = Utc::now();
        self.gateway.write_now(WriteOp::UpdateThread(thread)).await?;
        self.gateway.write_now(WriteOp::CreateRun(run.clone())).await?;

        let hub = Arc::new(TraceHub::new(run.id, self.subscriber_buffer));
        let stream = EventStreamer::new(run.id, hub.subscribe());
        let scope = RunScope::root(Arc::clone(&hub));
        self.pipeline.register(&run, &scope);

        let pipeline = Arc::clone(&self.pipeline);
        let task_run = run.clone();
        let completion = tokio::spawn(async move {
            let status = pipeline.execute(task_run, scope, Some(lease)).await;
            hub.close();
            status
        });

        info!(run_id = %run.id, %thread_id, agent_id = %run.agent_id, "run started");
        Ok(StartedRun {
            run,
            stream,
            completion,
        })
    }

    /// Request cancellation of a run and its sub-runs.
    ///
    /// Returns `false` if the run already finished. A stored run that is
    /// unfinished but not executing in this process is marked cancelled.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<bool, RunError> {
        if let Some(token) = self.pipeline.cancellation_token(&run_id) {
            token.cancel();
            info!(%run_id, "run cancellation requested");
            return Ok(true);
        }
        let mut run = self
            .gateway
            .get_run(&run_id)
            .await?
            .ok_or(RunError::RunNotFound(run_id))?;
        if run.is_terminal() || !run.transition(RunStatus::Cancelled) {
            return Ok(false);
        }
        self.gateway.write_now(WriteOp::UpdateRun(run)).await?;
        warn!(%run_id, "cancelled a run that was not executing");
        Ok(true)
    }

    /// The run with its ordered steps.
    ///
    /// Steps of an executing run come from its ledger, so they include
    /// writes still queued for storage.
    pub async fn get_run(&self, run_id: Uuid) -> Result<RunWithSteps, RunError> {
        let run = self
            .gateway
            .get_run(&run_id)
            .await?
            .ok_or(RunError::RunNotFound(run_id))?;
        let steps = self.steps_since(run_id, None).await?;
        Ok(RunWithSteps { run, steps })
    }

    /// Steps with `sequence > since` (all when `since` is `None`).
    pub async fn steps_since(&self, run_id: Uuid, since: Option<u64>) -> Result<Vec<Step>, RunError> {
        if let Some(steps) = self.pipeline.live_steps(&run_id, since).await {
            return Ok(steps);
        }
        if self.gateway.get_run(&run_id).await?.is_none() {
            return Err(RunError::RunNotFound(run_id));
        }
        Ok(self.gateway.list_steps(&run_id, since).await?)
    }

    pub async fn list_runs(&self, thread_id: Uuid) -> Result<Vec<Run>, RunError> {
        if self.gateway.get_thread(&thread_id).await?.is_none() {
            return Err(RunError::ThreadNotFound(thread_id));
        }
        Ok(self.gateway.list_runs(&thread_id).await?)
    }

    /// The persisted run plus its handoff sub-runs, recursively.
    pub async fn run_trace(&self, run_id: Uuid) -> Result<RunTrace, RunError> {
        let run = self
            .gateway
            .get_run(&run_id)
            .await?
            .ok_or(RunError::RunNotFound(run_id))?;
        self.load_trace(run, self.max_handoff_depth.saturating_add(1)).await
    }

    /// Events a live client of this run would have received.
    pub async fn replay(&self, run_id: Uuid) -> Result<Vec<RunEvent>, RunError> {
        let trace = self.run_trace(run_id).await?;
        Ok(EventStreamer::replay_tree(&trace))
    }

    fn load_trace(
        &self,
        run: Run,
        budget: u8,
    ) -> Pin<Box<dyn Future<Output = Result<RunTrace, RunError>> + Send + '_>> {
        Box::pin(async move {
            let steps = self.gateway.list_steps(&run.id, None).await?;
            let mut children = Vec::new();
            if budget > 0 {
                for step in &steps {
                    let StepPayload::Handoff(record) = &step.payload else {
                        continue;
                    };
                    match self.gateway.get_run(&record.child_run_id).await? {
                        Some(child) => children.push(self.load_trace(child, budget - 1).await?),
                        None => warn!(
                            run_id = %run.id,
                            child_run_id = %record.child_run_id,
                            "handoff child run not found"
                        ),
                    }
                }
            }
            Ok(RunTrace {
                run,
                steps,
                children,
            })
        })
    }

    /// Fail runs left unfinished by a previous process.
    ///
    /// Call once at startup, before serving requests. Returns the number of
    /// runs marked failed.
    pub async fn recover_interrupted_runs(&self) -> Result<usize, RunError> {
        let mut recovered = 0;
        for mut run in self.gateway.list_unfinished_runs().await? {
            if self.pipeline.is_executing(&run.id) {
                continue;
            }
            run.error = Some(INTERRUPTED_MESSAGE.to_string());
            if !run.transition(RunStatus::Failed) {
                continue;
            }
            self.gateway.write_now(WriteOp::UpdateRun(run.clone())).await?;
            warn!(run_id = %run.id, thread_id = %run.thread_id, "marked interrupted run as failed");
            recovered += 1;
        }
        Ok(recovered)
    }
}
