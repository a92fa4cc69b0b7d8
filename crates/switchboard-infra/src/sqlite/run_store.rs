//! SQLite run store implementation.
//!
//! Implements `RunStore` from `switchboard-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, RFC 3339 timestamps
//! with fixed nanosecond precision so text order is time order.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use switchboard_core::repository::RunStore;
use switchboard_types::error::RepositoryError;
use switchboard_types::run::{Run, RunStatus};
use switchboard_types::step::{Step, StepKind, StepPayload};
use switchboard_types::thread::{Thread, ThreadStatus};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `RunStore`.
#[derive(Clone)]
pub struct SqliteRunStore {
    pool: DatabasePool,
}

impl SqliteRunStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ThreadRow {
    id: String,
    agent_id: String,
    status: String,
    title: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ThreadRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            agent_id: row.try_get("agent_id")?,
            status: row.try_get("status")?,
            title: row.try_get("title")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_thread(self) -> Result<Thread, RepositoryError> {
        let status: ThreadStatus = self.status.parse().map_err(RepositoryError::Query)?;
        Ok(Thread {
            id: parse_uuid(&self.id, "thread id")?,
            agent_id: self.agent_id,
            status,
            title: self.title,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct RunRow {
    id: String,
    thread_id: String,
    agent_id: String,
    input: String,
    status: String,
    started_at: String,
    ended_at: Option<String>,
    parent_run_id: Option<String>,
    depth: i64,
    error: Option<String>,
}

impl RunRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            thread_id: row.try_get("thread_id")?,
            agent_id: row.try_get("agent_id")?,
            input: row.try_get("input")?,
            status: row.try_get("status")?,
            started_at: row.try_get("started_at")?,
            ended_at: row.try_get("ended_at")?,
            parent_run_id: row.try_get("parent_run_id")?,
            depth: row.try_get("depth")?,
            error: row.try_get("error")?,
        })
    }

    fn into_run(self) -> Result<Run, RepositoryError> {
        let status: RunStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let depth = u8::try_from(self.depth)
            .map_err(|_| RepositoryError::Query(format!("invalid run depth: {}", self.depth)))?;
        Ok(Run {
            id: parse_uuid(&self.id, "run id")?,
            thread_id: parse_uuid(&self.thread_id, "thread_id")?,
            agent_id: self.agent_id,
            input: self.input,
            status,
            started_at: parse_datetime(&self.started_at)?,
            ended_at: self.ended_at.as_deref().map(parse_datetime).transpose()?,
            parent_run_id: self
                .parent_run_id
                .as_deref()
                .map(|id| parse_uuid(id, "parent_run_id"))
                .transpose()?,
            depth,
            error: self.error,
        })
    }
}

struct StepRow {
    id: String,
    run_id: String,
    sequence: i64,
    kind: String,
    payload: String,
    created_at: String,
}

impl StepRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            sequence: row.try_get("sequence")?,
            kind: row.try_get("kind")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_step(self) -> Result<Step, RepositoryError> {
        let kind: StepKind = self.kind.parse().map_err(RepositoryError::Query)?;
        let body: serde_json::Value = serde_json::from_str(&self.payload)
            .map_err(|e| RepositoryError::Query(format!("invalid step payload: {e}")))?;
        let payload: StepPayload =
            serde_json::from_value(serde_json::json!({ "kind": kind, "payload": body }))
                .map_err(|e| RepositoryError::Query(format!("invalid {kind} payload: {e}")))?;
        let sequence = u64::try_from(self.sequence)
            .map_err(|_| RepositoryError::Query(format!("invalid sequence: {}", self.sequence)))?;
        Ok(Step {
            id: parse_uuid(&self.id, "step id")?,
            run_id: parse_uuid(&self.run_id, "run_id")?,
            sequence,
            payload,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str, what: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what}: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Classify a sqlx error so the gateway knows what is worth retrying.
fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map(|code| code & 0xff);
            if matches!(primary, Some(5 | 6)) {
                RepositoryError::Busy(db_err.message().to_string())
            } else if db_err.is_unique_violation() {
                RepositoryError::Conflict(db_err.message().to_string())
            } else {
                RepositoryError::Query(db_err.message().to_string())
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection(err.to_string())
        }
        _ => RepositoryError::Query(err.to_string()),
    }
}

/// Split a payload into its `kind` and `payload` columns.
fn payload_columns(payload: &StepPayload) -> Result<(String, String), RepositoryError> {
    let value = serde_json::to_value(payload)
        .map_err(|e| RepositoryError::Query(format!("unserializable step payload: {e}")))?;
    let body = value.get("payload").cloned().unwrap_or(serde_json::Value::Null);
    Ok((payload.kind().to_string(), body.to_string()))
}

fn collect<T>(
    rows: &[SqliteRow],
    map: impl Fn(&SqliteRow) -> Result<T, RepositoryError>,
) -> Result<Vec<T>, RepositoryError> {
    rows.iter().map(map).collect()
}

fn thread_from(row: &SqliteRow) -> Result<Thread, RepositoryError> {
    ThreadRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_thread()
}

fn run_from(row: &SqliteRow) -> Result<Run, RepositoryError> {
    RunRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_run()
}

fn step_from(row: &SqliteRow) -> Result<Step, RepositoryError> {
    StepRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_step()
}

// ---------------------------------------------------------------------------
// RunStore implementation
// ---------------------------------------------------------------------------

impl RunStore for SqliteRunStore {
    async fn create_thread(&self, thread: &Thread) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO threads (id, agent_id, status, title, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(thread.id.to_string())
        .bind(&thread.agent_id)
        .bind(thread.status.to_string())
        .bind(&thread.title)
        .bind(format_datetime(&thread.created_at))
        .bind(format_datetime(&thread.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_thread(&self, thread_id: &Uuid) -> Result<Option<Thread>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM threads WHERE id = ?")
            .bind(thread_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(thread_from).transpose()
    }

    async fn update_thread(&self, thread: &Thread) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE threads SET title = ?, status = ?, updated_at = ? WHERE id = ?"#,
        )
        .bind(&thread.title)
        .bind(thread.status.to_string())
        .bind(format_datetime(&thread.updated_at))
        .bind(thread.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_threads(
        &self,
        agent_id: Option<&str>,
        include_deleted: bool,
    ) -> Result<Vec<Thread>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM threads WHERE 1 = 1");
        if !include_deleted {
            sql.push_str(" AND status != 'deleted'");
        }
        if agent_id.is_some() {
            sql.push_str(" AND agent_id = ?");
        }
        sql.push_str(" ORDER BY updated_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(agent_id) = agent_id {
            query = query.bind(agent_id);
        }
        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;
        collect(&rows, thread_from)
    }

    async fn create_run(&self, run: &Run) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO runs (id, thread_id, agent_id, input, status, started_at, ended_at, parent_run_id, depth, error)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.thread_id.to_string())
        .bind(&run.agent_id)
        .bind(&run.input)
        .bind(run.status.to_string())
        .bind(format_datetime(&run.started_at))
        .bind(run.ended_at.as_ref().map(format_datetime))
        .bind(run.parent_run_id.map(|id| id.to_string()))
        .bind(i64::from(run.depth))
        .bind(&run.error)
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_run(&self, run: &Run) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE runs SET status = ?, ended_at = ?, error = ? WHERE id = ?"#,
        )
        .bind(run.status.to_string())
        .bind(run.ended_at.as_ref().map(format_datetime))
        .bind(&run.error)
        .bind(run.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(run_from).transpose()
    }

    async fn list_runs(&self, thread_id: &Uuid) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM runs WHERE thread_id = ? ORDER BY started_at ASC, id ASC")
            .bind(thread_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx_error)?;
        collect(&rows, run_from)
    }

    async fn list_unfinished_runs(&self) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM runs WHERE status IN ('pending', 'streaming') ORDER BY started_at ASC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;
        collect(&rows, run_from)
    }

    async fn insert_step(&self, step: &Step) -> Result<(), RepositoryError> {
        let (kind, payload) = payload_columns(&step.payload)?;
        let sequence = i64::try_from(step.sequence)
            .map_err(|_| RepositoryError::Query(format!("sequence out of range: {}", step.sequence)))?;

        // A retried write of the same step id is a no-op; a different step
        // at an occupied sequence still violates UNIQUE(run_id, sequence).
        sqlx::query(
            r#"INSERT INTO steps (id, run_id, sequence, kind, payload, created_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(step.id.to_string())
        .bind(step.run_id.to_string())
        .bind(sequence)
        .bind(kind)
        .bind(payload)
        .bind(format_datetime(&step.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_steps(&self, run_id: &Uuid, since: Option<u64>) -> Result<Vec<Step>, RepositoryError> {
        let floor = since.map_or(-1, |s| i64::try_from(s).unwrap_or(i64::MAX));
        let rows = sqlx::query(
            "SELECT * FROM steps WHERE run_id = ? AND sequence > ? ORDER BY sequence ASC",
        )
        .bind(run_id.to_string())
        .bind(floor)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;
        collect(&rows, step_from)
    }
}
