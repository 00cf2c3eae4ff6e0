//! Web call provisioning endpoints.

use crate::api::error::{ApiError, ApiResult};
use crate::api::ServerState;
use crate::backend::{CallDetails, CreateWebCallRequest, WebCall};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use tracing::{error, info};

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/calls/create-web-call", post(create_web_call))
        .route("/calls/:call_id", get(get_call))
}

/// POST /calls/create-web-call - Exchange an agent id for call credentials.
///
/// # Request Body
/// `{"agent_id": "...", "metadata": {...}}`, `metadata` optional.
///
/// # Response
/// `{"call_id", "access_token", "sample_rate"}`
async fn create_web_call(
    State(state): State<ServerState>,
    Json(request): Json<CreateWebCallRequest>,
) -> ApiResult<Json<WebCall>> {
    info!("Create web call requested for agent {}", request.agent_id);

    let call = state
        .platform
        .create_web_call(&request)
        .await
        .map_err(|e| {
            error!("Error creating web call: {}", e);
            ApiError::platform(e, "Failed to create web call")
        })?;
    Ok(Json(call))
}

/// GET /calls/:call_id - Status and timestamps of a call.
async fn get_call(
    State(state): State<ServerState>,
    Path(call_id): Path<String>,
) -> ApiResult<Json<CallDetails>> {
    let call = state.platform.get_call(&call_id).await.map_err(|e| {
        error!("Error fetching call {}: {}", call_id, e);
        ApiError::platform(e, "Failed to fetch call")
    })?;
    Ok(Json(call))
}
