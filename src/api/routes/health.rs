//! Health endpoint.

use crate::api::ServerState;
use crate::backend::{HealthStatus, ServiceHealth};
use axum::{extract::State, response::Json, routing::get, Router};

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

/// GET /health - Liveness plus whether calls can be provisioned.
async fn health(State(state): State<ServerState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: ServiceHealth::Ok,
        api_key_configured: state.platform.is_configured(),
    })
}
