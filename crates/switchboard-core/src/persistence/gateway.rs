//! PersistenceGateway: ordered, bounded, retrying write path.
//!
//! Each run gets a lane: a bounded `mpsc` queue drained by one task, so the
//! run's writes execute in submission order. A process-wide semaphore caps
//! how many writes execute at once across all lanes. `submit` waits only
//! for a queue slot, never for the storage round trip.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use switchboard_types::config::PersistenceConfig;
use switchboard_types::error::{PersistenceError, RepositoryError};
use switchboard_types::run::Run;
use switchboard_types::step::Step;
use switchboard_types::thread::Thread;

use super::retry::RetryPolicy;
use crate::repository::RunStore;

/// One storage write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    CreateThread(Thread),
    UpdateThread(Thread),
    CreateRun(Run),
    UpdateRun(Run),
    InsertStep(Step),
}

impl WriteOp {
    pub fn label(&self) -> &'static str {
        match self {
            WriteOp::CreateThread(_) => "create_thread",
            WriteOp::UpdateThread(_) => "update_thread",
            WriteOp::CreateRun(_) => "create_run",
            WriteOp::UpdateRun(_) => "update_run",
            WriteOp::InsertStep(_) => "insert_step",
        }
    }

    async fn apply<S: RunStore>(&self, store: &S) -> Result<(), RepositoryError> {
        match self {
            WriteOp::CreateThread(thread) => store.create_thread(thread).await,
            WriteOp::UpdateThread(thread) => store.update_thread(thread).await,
            WriteOp::CreateRun(run) => store.create_run(run).await,
            WriteOp::UpdateRun(run) => store.update_run(run).await,
            WriteOp::InsertStep(step) => store.insert_step(step).await,
        }
    }
}

struct Lane {
    tx: mpsc::Sender<WriteOp>,
    drain: JoinHandle<Result<(), PersistenceError>>,
}

struct Shared<S> {
    store: Arc<S>,
    permits: Semaphore,
    policy: RetryPolicy,
    /// First write failure per run, kept until `finish`.
    failures: DashMap<Uuid, PersistenceError>,
}

impl<S: RunStore> Shared<S> {
    /// Execute one write under a worker permit, retrying transient errors.
    async fn execute(&self, op: &WriteOp) -> Result<(), PersistenceError> {
        let mut attempt = 0u32;
        loop {
            let outcome = {
                let _permit = self.permits.acquire().await.map_err(|_| {
                    PersistenceError::Permanent("persistence worker pool is closed".to_string())
                })?;
                op.apply(self.store.as_ref()).await
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(err) if self.policy.should_retry(attempt, &err) => {
                    let delay = self.policy.delay_for(attempt);
                    debug!(
                        op = op.label(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient storage error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(PersistenceError::Exhausted {
                        attempts: attempt + 1,
                        message: err.to_string(),
                    });
                }
                Err(err) => return Err(PersistenceError::Permanent(err.to_string())),
            }
        }
    }
}

async fn drain_lane<S: RunStore>(
    shared: Arc<Shared<S>>,
    run_id: Uuid,
    mut rx: mpsc::Receiver<WriteOp>,
) -> Result<(), PersistenceError> {
    while let Some(op) = rx.recv().await {
        if let Err(err) = shared.execute(&op).await {
            error!(%run_id, op = op.label(), error = %err, "persistence write failed");
            shared.failures.insert(run_id, err.clone());
            rx.close();
            return Err(err);
        }
    }
    Ok(())
}

/// Async-safe facade over a [`RunStore`].
///
/// Writes for a run go through its lane (`open_lane`, `submit`, `finish`);
/// one-off writes outside a run's trace use `write_now`. Reads pass through
/// to the store.
pub struct PersistenceGateway<S: RunStore> {
    shared: Arc<Shared<S>>,
    lanes: Arc<DashMap<Uuid, Lane>>,
    lane_capacity: usize,
}

impl<S: RunStore> Clone for PersistenceGateway<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            lanes: Arc::clone(&self.lanes),
            lane_capacity: self.lane_capacity,
        }
    }
}

impl<S: RunStore> PersistenceGateway<S> {
    pub fn new(store: Arc<S>, config: &PersistenceConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                permits: Semaphore::new(config.workers.max(1)),
                policy: RetryPolicy::from_config(config),
                failures: DashMap::new(),
            }),
            lanes: Arc::new(DashMap::new()),
            lane_capacity: config.lane_capacity.max(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.shared.store
    }

    /// Open the write lane for a run. Opening an open lane is a no-op.
    pub fn open_lane(&self, run_id: Uuid) {
        self.lanes.entry(run_id).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(self.lane_capacity);
            let drain = tokio::spawn(drain_lane(Arc::clone(&self.shared), run_id, rx));
            debug!(%run_id, "opened write lane");
            Lane { tx, drain }
        });
    }

    /// Queue a write on the run's lane.
    ///
    /// Waits for a free slot when the lane is full. Fails if the lane is not
    /// open or has already stopped on a write failure.
    pub async fn submit(&self, run_id: Uuid, op: WriteOp) -> Result<(), PersistenceError> {
        let tx = match self.lanes.get(&run_id) {
            Some(lane) => lane.tx.clone(),
            None => return Err(self.closed_error(run_id)),
        };
        tx.send(op).await.map_err(|_| self.closed_error(run_id))
    }

    /// The write failure recorded for a run, if any.
    pub fn failure(&self, run_id: &Uuid) -> Option<PersistenceError> {
        self.shared.failures.get(run_id).map(|e| e.clone())
    }

    /// Close the run's lane and wait until every queued write is executed.
    ///
    /// Returns the first write failure of the run.
    pub async fn finish(&self, run_id: Uuid) -> Result<(), PersistenceError> {
        let drained = match self.lanes.remove(&run_id) {
            Some((_, Lane { tx, drain })) => {
                drop(tx);
                match drain.await {
                    Ok(result) => result,
                    Err(join_err) => {
                        warn!(%run_id, error = %join_err, "write lane task did not complete");
                        Err(PersistenceError::Permanent(format!(
                            "write lane task failed: {join_err}"
                        )))
                    }
                }
            }
            None => Ok(()),
        };
        let recorded = self.shared.failures.remove(&run_id).map(|(_, e)| e);

        match (drained, recorded) {
            (Err(err), _) | (Ok(()), Some(err)) => Err(err),
            (Ok(()), None) => Ok(()),
        }
    }

    /// Execute a write immediately (with retries) and wait for it.
    pub async fn write_now(&self, op: WriteOp) -> Result<(), PersistenceError> {
        self.shared.execute(&op).await
    }

    /// Keep executing a write in the background until it lands.
    ///
    /// Rounds of `write_now` are spaced by the maximum backoff. A round that
    /// fails with a permanent error ends the task.
    pub fn write_eventually(&self, op: WriteOp) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut round = 1u32;
            loop {
                tokio::time::sleep(shared.policy.max).await;
                match shared.execute(&op).await {
                    Ok(()) => {
                        debug!(op = op.label(), round, "deferred write landed");
                        return;
                    }
                    Err(err @ PersistenceError::Exhausted { .. }) => {
                        warn!(op = op.label(), round, error = %err, "deferred write still failing");
                        round += 1;
                    }
                    Err(err) => {
                        error!(op = op.label(), round, error = %err, "deferred write abandoned");
                        return;
                    }
                }
            }
        })
    }

    /// Number of runs with an open lane.
    pub fn open_lanes(&self) -> usize {
        self.lanes.len()
    }

    fn closed_error(&self, run_id: Uuid) -> PersistenceError {
        self.failure(&run_id)
            .unwrap_or(PersistenceError::LaneClosed(run_id))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get_thread(&self, thread_id: &Uuid) -> Result<Option<Thread>, RepositoryError> {
        self.shared.store.get_thread(thread_id).await
    }

    pub async fn list_threads(
        &self,
        agent_id: Option<&str>,
        include_deleted: bool,
    ) -> Result<Vec<Thread>, RepositoryError> {
        self.shared.store.list_threads(agent_id, include_deleted).await
    }

    pub async fn get_run(&self, run_id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        self.shared.store.get_run(run_id).await
    }

    pub async fn list_runs(&self, thread_id: &Uuid) -> Result<Vec<Run>, RepositoryError> {
        self.shared.store.list_runs(thread_id).await
    }

    pub async fn list_unfinished_runs(&self) -> Result<Vec<Run>, RepositoryError> {
        self.shared.store.list_unfinished_runs().await
    }

    pub async fn list_steps(
        &self,
        run_id: &Uuid,
        since: Option<u64>,
    ) -> Result<Vec<Step>, RepositoryError> {
        self.shared.store.list_steps(run_id, since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRunStore;
    use switchboard_types::run::RunStatus;
    use switchboard_types::step::StepPayload;

    fn config() -> PersistenceConfig {
        PersistenceConfig {
            workers: 2,
            lane_capacity: 4,
            max_retries: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 4,
        }
    }

    async fn seeded(store: Arc<InMemoryRunStore>) -> (PersistenceGateway<InMemoryRunStore>, Run) {
        let gateway = PersistenceGateway::new(store, &config());
        let thread = Thread::new("it-support", None);
        let run = Run::new(thread.id, "it-support", "hi");
        gateway.write_now(WriteOp::CreateThread(thread)).await.unwrap();
        gateway.write_now(WriteOp::CreateRun(run.clone())).await.unwrap();
        (gateway, run)
    }

    fn step(run_id: Uuid, seq: u64) -> WriteOp {
        WriteOp::InsertStep(Step::new(
            run_id,
            seq,
            StepPayload::ModelCall { text: format!("t{seq}") },
        ))
    }

    #[tokio::test]
    async fn test_lane_preserves_submission_order() {
        let store = Arc::new(InMemoryRunStore::new());
        let (gateway, run) = seeded(Arc::clone(&store)).await;
        gateway.open_lane(run.id);
        for seq in 0..20 {
            gateway.submit(run.id, step(run.id, seq)).await.unwrap();
        }
        gateway.finish(run.id).await.unwrap();

        let steps = store.list_steps(&run.id, None).await.unwrap();
        let seqs: Vec<u64> = steps.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, (0..20).collect::<Vec<_>>());
        assert_eq!(gateway.open_lanes(), 0);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let store = Arc::new(InMemoryRunStore::new());
        let (gateway, run) = seeded(Arc::clone(&store)).await;
        store.fail_step_writes(2, RepositoryError::Busy("database is locked".into()));

        gateway.open_lane(run.id);
        gateway.submit(run.id, step(run.id, 0)).await.unwrap();
        gateway.finish(run.id).await.unwrap();

        assert_eq!(store.step_write_attempts(), 3);
        assert_eq!(store.list_steps(&run.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_reported() {
        let store = Arc::new(InMemoryRunStore::new());
        let (gateway, run) = seeded(Arc::clone(&store)).await;
        store.fail_step_writes(100, RepositoryError::Connection("refused".into()));

        gateway.open_lane(run.id);
        gateway.submit(run.id, step(run.id, 0)).await.unwrap();
        let err = gateway.finish(run.id).await.unwrap_err();
        match err {
            PersistenceError::Exhausted { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(store.step_write_attempts(), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let store = Arc::new(InMemoryRunStore::new());
        let gateway = PersistenceGateway::new(Arc::clone(&store), &config());
        let orphan_run = Uuid::now_v7();

        gateway.open_lane(orphan_run);
        gateway.submit(orphan_run, step(orphan_run, 0)).await.unwrap();
        let err = gateway.finish(orphan_run).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Permanent(_)));
        assert_eq!(store.step_write_attempts(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_visible_before_finish() {
        let store = Arc::new(InMemoryRunStore::new());
        let (gateway, run) = seeded(Arc::clone(&store)).await;
        store.fail_step_writes(1, RepositoryError::Query("disk I/O error".into()));

        gateway.open_lane(run.id);
        gateway.submit(run.id, step(run.id, 0)).await.unwrap();
        for _ in 0..200 {
            if gateway.failure(&run.id).is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(gateway.failure(&run.id).is_some());
        assert!(gateway.submit(run.id, step(run.id, 1)).await.is_err());
        assert!(gateway.finish(run.id).await.is_err());
        assert!(gateway.failure(&run.id).is_none());
    }

    #[tokio::test]
    async fn test_write_eventually_outlasts_exhaustion() {
        let store = Arc::new(InMemoryRunStore::new());
        let (gateway, mut run) = seeded(Arc::clone(&store)).await;
        run.transition(RunStatus::Failed);
        store.fail_terminal_run_updates(6, RepositoryError::Busy("database is locked".into()));

        assert!(gateway.write_now(WriteOp::UpdateRun(run.clone())).await.is_err());
        gateway.write_eventually(WriteOp::UpdateRun(run.clone())).await.unwrap();

        let stored = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_submit_without_lane_fails() {
        let store = Arc::new(InMemoryRunStore::new());
        let (gateway, run) = seeded(store).await;
        let err = gateway.submit(run.id, step(run.id, 0)).await.unwrap_err();
        assert!(matches!(err, PersistenceError::LaneClosed(id) if id == run.id));
    }
}
