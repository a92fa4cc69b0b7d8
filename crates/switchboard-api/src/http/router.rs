//! Axum router: REST API under `/api/v1`, plus `/health`.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/agents", get(handlers::agent::list_agents))
        .route(
            "/threads",
            get(handlers::thread::list_threads).post(handlers::thread::create_thread),
        )
        .route(
            "/threads/{id}",
            get(handlers::thread::get_thread)
                .patch(handlers::thread::update_thread)
                .delete(handlers::thread::delete_thread),
        )
        .route(
            "/threads/{thread_id}/runs",
            get(handlers::run::list_runs).post(handlers::run::start_run),
        )
        .route(
            "/threads/{thread_id}/runs/{run_id}",
            get(handlers::run::get_run),
        )
        .route(
            "/threads/{thread_id}/runs/{run_id}/steps",
            get(handlers::run::list_steps),
        )
        .route(
            "/threads/{thread_id}/runs/{run_id}/events",
            get(handlers::run::replay_events),
        )
        .route(
            "/threads/{thread_id}/runs/{run_id}/cancel",
            post(handlers::run::cancel_run),
        );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([axum::http::HeaderName::from_static(handlers::run::RUN_ID_HEADER)]);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    /// Serve the router on an ephemeral port and return its base URL.
    async fn serve(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn get_json(url: &str) -> (u16, serde_json::Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_health_and_routes() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &[("it-support", "{\"event\":\"run_end\"}\n")]).await;
        let thread = state.threads.create_thread("it-support", None).await.unwrap();
        let base = serve(state).await;

        let (status, body) = get_json(&format!("{base}/health")).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");

        let (status, body) = get_json(&format!("{base}/api/v1/threads/{}", thread.id)).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["agent_id"], "it-support");

        let (status, body) = get_json(&format!("{base}/api/v1/threads/not-a-uuid")).await;
        assert_eq!(status, 400);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");

        let (status, body) = get_json(&format!("{base}/api/v1/agents")).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"][0]["id"], "it-support");
    }
}
