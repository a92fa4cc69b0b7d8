//! Application error type mapping engine errors to HTTP statuses and the
//! envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use switchboard_types::error::{RepositoryError, RunError, ThreadError};

use super::response::ApiResponse;

#[derive(Debug)]
pub enum AppError {
    Thread(ThreadError),
    Run(RunError),
    /// Malformed request (bad id, bad query).
    Validation(String),
    Internal(String),
}

impl From<ThreadError> for AppError {
    fn from(e: ThreadError) -> Self {
        AppError::Thread(e)
    }
}

impl From<RunError> for AppError {
    fn from(e: RunError) -> Self {
        AppError::Run(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Run(RunError::Repository(e))
    }
}

type Mapped = (StatusCode, &'static str, String, Option<serde_json::Value>);

fn repository_status(e: &RepositoryError) -> (StatusCode, &'static str) {
    match e {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        RepositoryError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    }
}

impl AppError {
    fn mapped(&self) -> Mapped {
        match self {
            AppError::Thread(ThreadError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "THREAD_NOT_FOUND", self.message(), None)
            }
            AppError::Thread(ThreadError::Invalid(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
            }
            AppError::Thread(ThreadError::Repository(e)) => {
                let (status, code) = repository_status(e);
                (status, code, self.message(), None)
            }
            AppError::Thread(ThreadError::Persistence(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR", self.message(), None)
            }
            AppError::Run(RunError::ThreadBusy {
                thread_id,
                active_run_id,
            }) => (
                StatusCode::CONFLICT,
                "THREAD_BUSY",
                self.message(),
                Some(json!({
                    "thread_id": thread_id,
                    "active_run_id": active_run_id,
                })),
            ),
            AppError::Run(RunError::ThreadNotFound(_)) => {
                (StatusCode::NOT_FOUND, "THREAD_NOT_FOUND", self.message(), None)
            }
            AppError::Run(RunError::ThreadArchived(_)) => {
                (StatusCode::CONFLICT, "THREAD_ARCHIVED", self.message(), None)
            }
            AppError::Run(RunError::RunNotFound(_)) => {
                (StatusCode::NOT_FOUND, "RUN_NOT_FOUND", self.message(), None)
            }
            AppError::Run(RunError::UnknownAgent(_)) => {
                (StatusCode::BAD_REQUEST, "UNKNOWN_AGENT", self.message(), None)
            }
            AppError::Run(RunError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
            }
            AppError::Run(RunError::Repository(e)) => {
                let (status, code) = repository_status(e);
                (status, code, self.message(), None)
            }
            AppError::Run(RunError::Persistence(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR", self.message(), None)
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone(), None)
            }
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Thread(e) => e.to_string(),
            AppError::Run(e) => e.to_string(),
            AppError::Validation(msg) | AppError::Internal(msg) => msg.clone(),
        }
    }

}

#[cfg(test)]
impl AppError {
    pub fn status(&self) -> StatusCode {
        self.mapped().0
    }

    pub fn code(&self) -> &'static str {
        self.mapped().1
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.mapped();
        if status.is_server_error() {
            tracing::error!(%code, %message, "request failed");
        } else {
            tracing::debug!(%code, %message, "request rejected");
        }
        let body = ApiResponse::error(code, &message, details, Uuid::now_v7().to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_types::error::PersistenceError;

    #[test]
    fn test_thread_busy_is_conflict_with_details() {
        let thread_id = Uuid::now_v7();
        let active_run_id = Uuid::now_v7();
        let err = AppError::from(RunError::ThreadBusy {
            thread_id,
            active_run_id,
        });
        let (status, code, _, details) = err.mapped();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "THREAD_BUSY");
        assert_eq!(details.unwrap()["active_run_id"], active_run_id.to_string());
    }

    #[test]
    fn test_status_mapping() {
        let id = Uuid::now_v7();
        let cases = [
            (AppError::from(ThreadError::NotFound(id)), StatusCode::NOT_FOUND),
            (AppError::from(ThreadError::Invalid("x".into())), StatusCode::BAD_REQUEST),
            (AppError::from(RunError::ThreadNotFound(id)), StatusCode::NOT_FOUND),
            (AppError::from(RunError::RunNotFound(id)), StatusCode::NOT_FOUND),
            (AppError::from(RunError::ThreadArchived(id)), StatusCode::CONFLICT),
            (AppError::from(RunError::UnknownAgent("ghost".into())), StatusCode::BAD_REQUEST),
            (AppError::from(RunError::Validation("empty".into())), StatusCode::BAD_REQUEST),
            (
                AppError::from(RunError::Persistence(PersistenceError::Permanent("x".into()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppError::from(RepositoryError::Busy("locked".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AppError::Validation("bad id".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err:?}");
        }
    }

    #[tokio::test]
    async fn test_error_response_body() {
        let response = AppError::from(RunError::RunNotFound(Uuid::now_v7())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["errors"][0]["code"], "RUN_NOT_FOUND");
        assert!(value.get("data").is_none());
    }
}
