//! Run handlers: start (streaming), inspect, incremental step reads,
//! replay, and cancel.

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use switchboard_types::error::RunError;
use switchboard_types::event::RunEvent;
use switchboard_types::run::Run;
use switchboard_types::step::Step;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

use super::{RequestClock, parse_uuid};

/// Header carrying the id of a run started by `POST .../runs`.
pub const RUN_ID_HEADER: &str = "x-run-id";

const NDJSON: &str = "application/x-ndjson";

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct StepsQuery {
    /// Only steps with a greater sequence are returned.
    pub since: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RunDetail {
    pub run: Run,
    pub steps: Vec<Step>,
    /// What a live client of this run received, rebuilt from storage.
    pub events: Vec<RunEvent>,
}

#[derive(Debug, Serialize)]
pub struct CancelOutcome {
    pub run_id: Uuid,
    /// `false` when the run had already finished.
    pub cancelled: bool,
}

/// Parse both path ids and check the run belongs to the thread.
async fn resolve_run(state: &AppState, thread_id: &str, run_id: &str) -> Result<Run, AppError> {
    let thread_id = parse_uuid(thread_id)?;
    let run_id = parse_uuid(run_id)?;
    match state.coordinator.gateway().get_run(&run_id).await? {
        Some(run) if run.thread_id == thread_id => Ok(run),
        _ => Err(RunError::RunNotFound(run_id).into()),
    }
}

fn run_path(run: &Run) -> String {
    format!("/api/v1/threads/{}/runs/{}", run.thread_id, run.id)
}

/// POST /api/v1/threads/{thread_id}/runs
///
/// Responds `202 Accepted` with the run's events as NDJSON, one event per
/// line, flushed as they happen. The run keeps executing if the client
/// goes away.
pub async fn start_run(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(body): Json<StartRunRequest>,
) -> Result<Response, AppError> {
    let thread_id = parse_uuid(&thread_id)?;
    let started = state.coordinator.start_run(thread_id, &body.message).await?;
    let run_id = started.run.id;

    let lines = started.stream.into_stream().map(|event| event.to_ndjson_line());

    Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(header::CONTENT_TYPE, NDJSON)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(RUN_ID_HEADER, run_id.to_string())
        .body(Body::from_stream(lines))
        .map_err(|e| AppError::Internal(format!("failed to build stream response: {e}")))
}

/// GET /api/v1/threads/{thread_id}/runs
pub async fn list_runs(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Run>>>, AppError> {
    let clock = RequestClock::start();
    let runs = state.coordinator.list_runs(parse_uuid(&thread_id)?).await?;
    Ok(Json(
        ApiResponse::success(runs, clock.request_id.clone(), clock.elapsed_ms())
            .with_link("thread", &format!("/api/v1/threads/{thread_id}")),
    ))
}

/// GET /api/v1/threads/{thread_id}/runs/{run_id}
pub async fn get_run(
    State(state): State<AppState>,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<RunDetail>>, AppError> {
    let clock = RequestClock::start();
    let run = resolve_run(&state, &thread_id, &run_id).await?;
    let path = run_path(&run);

    let with_steps = state.coordinator.get_run(run.id).await?;
    let events = state.coordinator.replay(run.id).await?;
    let detail = RunDetail {
        run: with_steps.run,
        steps: with_steps.steps,
        events,
    };

    Ok(Json(
        ApiResponse::success(detail, clock.request_id.clone(), clock.elapsed_ms())
            .with_link("self", &path)
            .with_link("steps", &format!("{path}/steps"))
            .with_link("events", &format!("{path}/events")),
    ))
}

/// GET /api/v1/threads/{thread_id}/runs/{run_id}/steps?since=N
pub async fn list_steps(
    State(state): State<AppState>,
    Path((thread_id, run_id)): Path<(String, String)>,
    Query(query): Query<StepsQuery>,
) -> Result<Json<ApiResponse<Vec<Step>>>, AppError> {
    let clock = RequestClock::start();
    let run = resolve_run(&state, &thread_id, &run_id).await?;
    let steps = state.coordinator.steps_since(run.id, query.since).await?;
    Ok(Json(ApiResponse::success(
        steps,
        clock.request_id.clone(),
        clock.elapsed_ms(),
    )))
}

/// GET /api/v1/threads/{thread_id}/runs/{run_id}/events
///
/// The replayed event stream as NDJSON, byte-for-byte what a live client
/// of a finished run received.
pub async fn replay_events(
    State(state): State<AppState>,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let run = resolve_run(&state, &thread_id, &run_id).await?;
    let mut body = String::new();
    for event in state.coordinator.replay(run.id).await? {
        let line = event
            .to_ndjson_line()
            .map_err(|e| AppError::Internal(format!("failed to encode event: {e}")))?;
        body.push_str(&line);
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, NDJSON)
        .body(Body::from(body))
        .map_err(|e| AppError::Internal(format!("failed to build response: {e}")))
}

/// POST /api/v1/threads/{thread_id}/runs/{run_id}/cancel
pub async fn cancel_run(
    State(state): State<AppState>,
    Path((thread_id, run_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<CancelOutcome>>, AppError> {
    let clock = RequestClock::start();
    let run = resolve_run(&state, &thread_id, &run_id).await?;
    let cancelled = state.coordinator.cancel_run(run.id).await?;
    let outcome = CancelOutcome {
        run_id: run.id,
        cancelled,
    };
    Ok(Json(
        ApiResponse::success(outcome, clock.request_id.clone(), clock.elapsed_ms())
            .with_link("run", &run_path(&run)),
    ))
}
