use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::http::response::ApiResponse;
use crate::state::AppState;

use super::RequestClock;

#[derive(Debug, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub description: String,
    pub supports_cancellation: bool,
}

/// GET /api/v1/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<ApiResponse<Vec<AgentSummary>>> {
    let clock = RequestClock::start();
    let agents = state
        .coordinator
        .agents()
        .list()
        .map(|agent| AgentSummary {
            id: agent.id.clone(),
            description: agent.description.clone(),
            supports_cancellation: agent.runtime.supports_cancellation(),
        })
        .collect();
    Json(ApiResponse::success(agents, clock.request_id.clone(), clock.elapsed_ms()).with_link("self", "/api/v1/agents"))
}
