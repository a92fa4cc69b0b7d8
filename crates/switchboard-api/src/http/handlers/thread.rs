//! Thread CRUD handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use switchboard_core::thread::ThreadUpdate;
use switchboard_types::thread::{Thread, ThreadStatus};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

use super::{RequestClock, parse_uuid};

#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    pub agent_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    pub agent_id: Option<String>,
}

/// Partial update: omitted fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateThreadRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<ThreadStatus>,
}

fn thread_links(response: ApiResponse<Thread>, id: &str) -> ApiResponse<Thread> {
    response
        .with_link("self", &format!("/api/v1/threads/{id}"))
        .with_link("runs", &format!("/api/v1/threads/{id}/runs"))
}

/// POST /api/v1/threads
pub async fn create_thread(
    State(state): State<AppState>,
    Json(body): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Thread>>), AppError> {
    let clock = RequestClock::start();
    let thread = state.threads.create_thread(&body.agent_id, body.title).await?;
    let id = thread.id.to_string();
    let response = ApiResponse::success(thread, clock.request_id.clone(), clock.elapsed_ms());
    Ok((StatusCode::CREATED, Json(thread_links(response, &id))))
}

/// GET /api/v1/threads?agent_id=
pub async fn list_threads(
    State(state): State<AppState>,
    Query(query): Query<ListThreadsQuery>,
) -> Result<Json<ApiResponse<Vec<Thread>>>, AppError> {
    let clock = RequestClock::start();
    let threads = state.threads.list_threads(query.agent_id.as_deref()).await?;
    Ok(Json(
        ApiResponse::success(threads, clock.request_id.clone(), clock.elapsed_ms())
            .with_link("self", "/api/v1/threads"),
    ))
}

/// GET /api/v1/threads/{id}
pub async fn get_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Thread>>, AppError> {
    let clock = RequestClock::start();
    let thread = state.threads.get_thread(parse_uuid(&id)?).await?;
    let response = ApiResponse::success(thread, clock.request_id.clone(), clock.elapsed_ms());
    Ok(Json(thread_links(response, &id)))
}

/// PATCH /api/v1/threads/{id}
pub async fn update_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateThreadRequest>,
) -> Result<Json<ApiResponse<Thread>>, AppError> {
    let clock = RequestClock::start();
    if body.title.is_none() && body.status.is_none() {
        return Err(AppError::Validation("nothing to update: set title or status".to_string()));
    }
    let thread = state
        .threads
        .update(
            parse_uuid(&id)?,
            ThreadUpdate {
                title: body.title,
                status: body.status,
            },
        )
        .await?;
    let response = ApiResponse::success(thread, clock.request_id.clone(), clock.elapsed_ms());
    Ok(Json(thread_links(response, &id)))
}

/// DELETE /api/v1/threads/{id}
///
/// Soft delete; the thread and its runs stay in storage.
pub async fn delete_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Thread>>, AppError> {
    let clock = RequestClock::start();
    let thread = state.threads.delete(parse_uuid(&id)?).await?;
    Ok(Json(ApiResponse::success(
        thread,
        clock.request_id.clone(),
        clock.elapsed_ms(),
    )))
}
