//! Agent listing endpoints.

use crate::api::error::{ApiError, ApiResult};
use crate::api::ServerState;
use crate::backend::{AgentList, AgentSummary};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use tracing::{error, info};

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/", get(list_agents))
        .route("/agents/:agent_id", get(get_agent))
}

/// GET /agents - All agents on the account.
async fn list_agents(State(state): State<ServerState>) -> ApiResult<Json<AgentList>> {
    let agents = state.platform.list_agents().await.map_err(|e| {
        error!("Error fetching agents: {}", e);
        ApiError::platform(e, "Failed to fetch agents")
    })?;

    info!("Serving {} agents", agents.len());
    Ok(Json(AgentList::new(agents)))
}

/// GET /agents/:agent_id - One agent.
async fn get_agent(
    State(state): State<ServerState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<AgentSummary>> {
    let agent = state.platform.get_agent(&agent_id).await.map_err(|e| {
        error!("Error fetching agent {}: {}", agent_id, e);
        ApiError::platform(e, "Failed to fetch agent")
    })?;
    Ok(Json(agent))
}
