//! RunStore trait definition.
//!
//! CRUD operations for threads, runs, and their ordered steps. Writes from
//! the engine reach a `RunStore` only through the persistence gateway; reads
//! may go directly to the store.

use switchboard_types::error::RepositoryError;
use switchboard_types::run::Run;
use switchboard_types::step::Step;
use switchboard_types::thread::Thread;
use uuid::Uuid;

/// Repository trait for thread, run, and step persistence.
///
/// Implementations live in switchboard-infra (`SqliteRunStore`) and in this
/// crate for tests (`InMemoryRunStore`). Uses native async fn in traits
/// (RPITIT, Rust 2024 edition).
pub trait RunStore: Send + Sync + 'static {
    /// Insert a new thread.
    fn create_thread(
        &self,
        thread: &Thread,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_thread(
        &self,
        thread_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Thread>, RepositoryError>> + Send;

    /// Overwrite title, status, and updated_at of an existing thread.
    fn update_thread(
        &self,
        thread: &Thread,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List non-deleted threads, newest first, optionally for one agent.
    fn list_threads(
        &self,
        agent_id: Option<&str>,
        include_deleted: bool,
    ) -> impl std::future::Future<Output = Result<Vec<Thread>, RepositoryError>> + Send;

    /// Insert a new run.
    fn create_run(
        &self,
        run: &Run,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Overwrite status, ended_at, and error of an existing run.
    fn update_run(
        &self,
        run: &Run,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Run>, RepositoryError>> + Send;

    /// Runs of a thread, ordered by started_at ASC.
    fn list_runs(
        &self,
        thread_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;

    /// Runs whose status is pending or streaming.
    fn list_unfinished_runs(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;

    /// Insert a step.
    ///
    /// Inserting a step whose id already exists is a no-op, so retried
    /// writes are safe. A different step at an occupied
    /// `(run_id, sequence)` is a `Conflict`.
    fn insert_step(
        &self,
        step: &Step,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Steps of a run ordered by sequence ASC, restricted to
    /// `sequence > since` when `since` is given.
    fn list_steps(
        &self,
        run_id: &Uuid,
        since: Option<u64>,
    ) -> impl std::future::Future<Output = Result<Vec<Step>, RepositoryError>> + Send;
}
