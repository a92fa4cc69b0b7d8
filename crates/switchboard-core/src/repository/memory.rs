//! In-memory `RunStore` used by tests and the scripted demo mode.
//!
//! Supports fault injection: a number of upcoming step writes, or terminal
//! run updates, can be made to fail with a chosen error, which is how
//! gateway retry and persistence-failure paths are exercised.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use switchboard_types::error::RepositoryError;
use switchboard_types::run::Run;
use switchboard_types::step::Step;
use switchboard_types::thread::{Thread, ThreadStatus};
use uuid::Uuid;

use super::run_store::RunStore;

#[derive(Default)]
struct Tables {
    threads: HashMap<Uuid, Thread>,
    runs: HashMap<Uuid, Run>,
    steps: HashMap<Uuid, Vec<Step>>,
}

#[derive(Default)]
struct Faults {
    step_failures: usize,
    step_error: Option<RepositoryError>,
    terminal_update_failures: usize,
    update_error: Option<RepositoryError>,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct InMemoryRunStore {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    step_writes: AtomicUsize,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` step inserts with `error`.
    pub fn fail_step_writes(&self, count: usize, error: RepositoryError) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.step_failures = count;
        faults.step_error = Some(error);
    }

    /// Fail the next `count` updates that move a run to a terminal status.
    pub fn fail_terminal_run_updates(&self, count: usize, error: RepositoryError) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        faults.terminal_update_failures = count;
        faults.update_error = Some(error);
    }

    /// Number of step insert attempts seen, including failed ones.
    pub fn step_write_attempts(&self) -> usize {
        self.step_writes.load(Ordering::SeqCst)
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn injected_step_failure(&self) -> Option<RepositoryError> {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        if faults.step_failures == 0 {
            return None;
        }
        faults.step_failures -= 1;
        faults.step_error.clone()
    }

    fn injected_update_failure(&self) -> Option<RepositoryError> {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        if faults.terminal_update_failures == 0 {
            return None;
        }
        faults.terminal_update_failures -= 1;
        faults.update_error.clone()
    }
}

impl RunStore for InMemoryRunStore {
    async fn create_thread(&self, thread: &Thread) -> Result<(), RepositoryError> {
        let mut tables = self.tables();
        if tables.threads.contains_key(&thread.id) {
            return Err(RepositoryError::Conflict(format!(
                "thread {} already exists",
                thread.id
            )));
        }
        tables.threads.insert(thread.id, thread.clone());
        Ok(())
    }

    async fn get_thread(&self, thread_id: &Uuid) -> Result<Option<Thread>, RepositoryError> {
        Ok(self.tables().threads.get(thread_id).cloned())
    }

    async fn update_thread(&self, thread: &Thread) -> Result<(), RepositoryError> {
        let mut tables = self.tables();
        match tables.threads.get_mut(&thread.id) {
            Some(existing) => {
                existing.title = thread.title.clone();
                existing.status = thread.status;
                existing.updated_at = thread.updated_at;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn list_threads(
        &self,
        agent_id: Option<&str>,
        include_deleted: bool,
    ) -> Result<Vec<Thread>, RepositoryError> {
        let tables = self.tables();
        let mut threads: Vec<Thread> = tables
            .threads
            .values()
            .filter(|t| include_deleted || t.status != ThreadStatus::Deleted)
            .filter(|t| agent_id.is_none_or(|a| t.agent_id == a))
            .cloned()
            .collect();
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(threads)
    }

    async fn create_run(&self, run: &Run) -> Result<(), RepositoryError> {
        let mut tables = self.tables();
        if !tables.threads.contains_key(&run.thread_id) {
            return Err(RepositoryError::Query(format!(
                "FOREIGN KEY constraint failed: thread {}",
                run.thread_id
            )));
        }
        if tables.runs.contains_key(&run.id) {
            return Err(RepositoryError::Conflict(format!("run {} already exists", run.id)));
        }
        tables.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &Run) -> Result<(), RepositoryError> {
        if run.is_terminal() {
            if let Some(err) = self.injected_update_failure() {
                return Err(err);
            }
        }
        let mut tables = self.tables();
        match tables.runs.get_mut(&run.id) {
            Some(existing) => {
                existing.status = run.status;
                existing.ended_at = run.ended_at;
                existing.error = run.error.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        Ok(self.tables().runs.get(run_id).cloned())
    }

    async fn list_runs(&self, thread_id: &Uuid) -> Result<Vec<Run>, RepositoryError> {
        let tables = self.tables();
        let mut runs: Vec<Run> = tables
            .runs
            .values()
            .filter(|r| r.thread_id == *thread_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(runs)
    }

    async fn list_unfinished_runs(&self) -> Result<Vec<Run>, RepositoryError> {
        let tables = self.tables();
        let mut runs: Vec<Run> = tables
            .runs
            .values()
            .filter(|r| !r.is_terminal())
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(runs)
    }

    async fn insert_step(&self, step: &Step) -> Result<(), RepositoryError> {
        self.step_writes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.injected_step_failure() {
            return Err(err);
        }

        let mut tables = self.tables();
        if !tables.runs.contains_key(&step.run_id) {
            return Err(RepositoryError::Query(format!(
                "FOREIGN KEY constraint failed: run {}",
                step.run_id
            )));
        }
        let steps = tables.steps.entry(step.run_id).or_default();
        if steps.iter().any(|s| s.id == step.id) {
            return Ok(());
        }
        if steps.iter().any(|s| s.sequence == step.sequence) {
            return Err(RepositoryError::Conflict(format!(
                "UNIQUE constraint failed: steps.run_id, steps.sequence ({})",
                step.sequence
            )));
        }
        steps.push(step.clone());
        steps.sort_by_key(|s| s.sequence);
        Ok(())
    }

    async fn list_steps(
        &self,
        run_id: &Uuid,
        since: Option<u64>,
    ) -> Result<Vec<Step>, RepositoryError> {
        let tables = self.tables();
        Ok(tables
            .steps
            .get(run_id)
            .map(|steps| {
                steps
                    .iter()
                    .filter(|s| since.is_none_or(|n| s.sequence > n))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
