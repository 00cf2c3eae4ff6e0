//! Provisioning proxy server.
//!
//! Provides HTTP endpoints for:
//! - Health and API key status
//! - Listing the account's voice agents
//! - Creating web calls and reading call details
//!
//! The voice platform API key stays on this server; clients only receive the
//! access token of the call they asked for.

pub mod error;
pub mod platform;
pub mod routes;

use crate::config::ServerConfig;
use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use platform::{PlatformClient, PlatformError};

const PLATFORM_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state handed to every route.
#[derive(Clone)]
pub struct ServerState {
    pub platform: Arc<PlatformClient>,
}

impl ServerState {
    pub fn new(platform: PlatformClient) -> Self {
        Self {
            platform: Arc::new(platform),
        }
    }
}

/// Build the application router. Exposed separately from [`ApiServer`] so it
/// can be driven in-process.
pub fn router(state: ServerState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(status))
        .merge(routes::health::router())
        .merge(routes::agents::router())
        .merge(routes::calls::router())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.iter().any(|origin| origin == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
}

pub struct ApiServer {
    address: String,
    cors_origins: Vec<String>,
    state: ServerState,
}

impl ApiServer {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let api_key = config.api_key().map(str::to_string);
        if api_key.is_none() {
            warn!("RETELL_API_KEY not configured; platform routes will fail");
        }

        let platform = PlatformClient::new(&config.platform_url, api_key, PLATFORM_TIMEOUT)
            .context("Failed to build platform HTTP client")?;

        Ok(Self {
            address: config.bind_address(),
            cors_origins: config.cors_origins.clone(),
            state: ServerState::new(platform),
        })
    }

    pub async fn start(self) -> Result<()> {
        let app = router(self.state, &self.cors_origins);

        let listener = tokio::net::TcpListener::bind(&self.address)
            .await
            .with_context(|| format!("Failed to bind {}", self.address))?;

        info!("API server listening on http://{}", self.address);
        info!("Endpoints:");
        info!("  GET  /                        - Service info");
        info!("  GET  /health                  - Health and API key status");
        info!("  GET  /agents                  - List agents");
        info!("  GET  /agents/:agent_id        - Get one agent");
        info!("  POST /calls/create-web-call   - Create a web call");
        info!("  GET  /calls/:call_id          - Get call details");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "webcall",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
