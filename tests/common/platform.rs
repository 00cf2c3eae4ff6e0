//! In-process stand-in for the voice platform REST API.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const API_KEY: &str = "key_test";

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Requests the fake platform has seen.
#[derive(Clone, Default)]
pub struct PlatformLog {
    web_calls: Arc<Mutex<Vec<Value>>>,
}

impl PlatformLog {
    pub fn web_calls(&self) -> Vec<Value> {
        self.web_calls.lock().unwrap().clone()
    }
}

/// Serve `app` on an ephemeral port, returning its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn spawn_fake_platform() -> (String, PlatformLog) {
    let log = PlatformLog::default();
    let app = Router::new()
        .route("/list-agents", get(list_agents))
        .route("/get-agent/:agent_id", get(get_agent))
        .route("/v2/create-web-call", post(create_web_call))
        .route("/v2/get-call/:call_id", get(get_call))
        .with_state(log.clone());
    (serve(app).await, log)
}

fn check_auth(headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let expected = format!("Bearer {API_KEY}");
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value.as_bytes() == expected.as_bytes() => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Unauthorized" })),
        )),
    }
}

fn not_found(what: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": format!("{what} not found") })),
    )
}

fn support_agent() -> Value {
    json!({
        "agent_id": "agent_1",
        "agent_name": "Support",
        "voice_id": "11labs-Adrian",
        "language": "en-US",
        "response_engine": { "type": "retell-llm" }
    })
}

async fn list_agents(headers: HeaderMap) -> Reply {
    check_auth(&headers)?;
    Ok(Json(json!([
        support_agent(),
        { "agent_id": "agent_2", "agent_name": null }
    ])))
}

async fn get_agent(headers: HeaderMap, Path(agent_id): Path<String>) -> Reply {
    check_auth(&headers)?;
    if agent_id == "agent_1" {
        Ok(Json(support_agent()))
    } else {
        Err(not_found("Agent"))
    }
}

async fn create_web_call(
    State(log): State<PlatformLog>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    check_auth(&headers)?;
    log.web_calls.lock().unwrap().push(body.clone());

    match body["agent_id"].as_str() {
        Some("agent_1") => Ok(Json(json!({
            "call_id": "call_42",
            "access_token": "tok_42",
            "agent_id": "agent_1",
            "call_status": "registered"
        }))),
        Some("broken") => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "internal failure" })),
        )),
        _ => Err(not_found("Agent")),
    }
}

async fn get_call(headers: HeaderMap, Path(call_id): Path<String>) -> Reply {
    check_auth(&headers)?;
    if call_id != "call_42" {
        return Err(not_found("Call"));
    }
    Ok(Json(json!({
        "call_id": "call_42",
        "agent_id": "agent_1",
        "call_status": "ended",
        "start_timestamp": 1_700_000_000_000i64,
        "end_timestamp": 1_700_000_060_000i64,
        "metadata": { "source": "test" }
    })))
}
