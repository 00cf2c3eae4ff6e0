//! Client for the voice platform REST API.
//!
//! The API key never leaves the server: browsers and the session controller
//! only ever see the short-lived access token of a provisioned call.

use crate::backend::{AgentSummary, CallDetails, CreateWebCallRequest, WebCall};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Retell API key not configured")]
    NotConfigured,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid API key or insufficient permissions")]
    Unauthorized,

    #[error("platform returned {status}: {message}")]
    Upstream { status: StatusCode, message: String },

    #[error("platform request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Agent record as the platform returns it; optional fields get defaults in
/// [`PlatformAgent::into_summary`].
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformAgent {
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl PlatformAgent {
    pub fn into_summary(self) -> AgentSummary {
        let agent_name = non_blank(self.agent_name)
            .unwrap_or_else(|| format!("Agent {}", self.agent_id));
        AgentSummary {
            agent_name,
            voice_id: non_blank(self.voice_id).unwrap_or_else(|| "default".to_string()),
            language: non_blank(self.language).unwrap_or_else(|| "en-US".to_string()),
            agent_id: self.agent_id,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct PlatformErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

pub struct PlatformClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PlatformClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>, PlatformError> {
        info!("Fetching agents from the voice platform");
        let agents: Vec<PlatformAgent> = self
            .send(self.client.get(self.url("/list-agents")), "agents")
            .await?;
        info!("Retrieved {} agents", agents.len());
        Ok(agents.into_iter().map(PlatformAgent::into_summary).collect())
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<AgentSummary, PlatformError> {
        debug!("Fetching agent {}", agent_id);
        let request = self.client.get(self.url(&format!("/get-agent/{agent_id}")));
        let agent: PlatformAgent = self.send(request, &format!("Agent {agent_id}")).await?;
        Ok(agent.into_summary())
    }

    pub async fn create_web_call(
        &self,
        request: &CreateWebCallRequest,
    ) -> Result<WebCall, PlatformError> {
        info!("Creating web call for agent: {}", request.agent_id);
        let builder = self.client.post(self.url("/v2/create-web-call")).json(request);
        let call: WebCall = self
            .send(builder, &format!("Agent {}", request.agent_id))
            .await?;
        info!("Web call created: {}", call.call_id);
        Ok(call)
    }

    pub async fn get_call(&self, call_id: &str) -> Result<CallDetails, PlatformError> {
        debug!("Fetching call {}", call_id);
        let request = self.client.get(self.url(&format!("/v2/get-call/{call_id}")));
        self.send(request, &format!("Call {call_id}")).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `subject` names the resource in a not-found error.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        subject: &str,
    ) -> Result<T, PlatformError> {
        let api_key = self.api_key.as_deref().ok_or(PlatformError::NotConfigured)?;
        let response = request.bearer_auth(api_key).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        error!("Platform request failed with status {}: {}", status, body);
        Err(match status {
            StatusCode::NOT_FOUND => PlatformError::NotFound(subject.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Unauthorized,
            _ => PlatformError::Upstream {
                status,
                message: upstream_message(&body),
            },
        })
    }
}

fn upstream_message(body: &str) -> String {
    serde_json::from_str::<PlatformErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error_message))
        .unwrap_or_else(|| body.trim().to_string())
}
