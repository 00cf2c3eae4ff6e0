//! Client for the provisioning backend.
//!
//! The backend exchanges an agent id for short-lived call credentials and
//! lists the agents available to the account.

pub mod types;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};

pub use types::{
    AgentList, AgentSummary, CallDetails, CreateWebCallRequest, HealthStatus, ServiceHealth,
    WebCall, DEFAULT_SAMPLE_RATE,
};

/// Exchanges an agent id for call credentials.
#[async_trait]
pub trait CallProvisioner: Send + Sync {
    async fn create_web_call(
        &self,
        agent_id: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<WebCall>;
}

/// Lists the voice agents a user can call.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn list_agents(&self) -> Result<Vec<AgentSummary>>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build backend HTTP client")?;

        info!("Using provisioning backend at {}", base_url);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn health_check(&self) -> Result<HealthStatus> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match response {
            Ok(response) => response
                .json::<HealthStatus>()
                .await
                .map_err(|_| anyhow!("Backend service is not available")),
            Err(e) => {
                error!("Health check failed: {}", e);
                Err(anyhow!("Backend service is not available"))
            }
        }
    }

    pub async fn get_agents(&self) -> Result<AgentList> {
        let request = self.client.get(self.url("/agents/"));
        self.send_json(request, "Failed to fetch agents").await
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<AgentSummary> {
        let request = self.client.get(self.url(&format!("/agents/{agent_id}")));
        self.send_json(request, &format!("Failed to fetch agent {agent_id}"))
            .await
    }

    pub async fn create_call(
        &self,
        agent_id: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<WebCall> {
        debug!("Creating web call for agent: {}", agent_id);
        let body = CreateWebCallRequest {
            agent_id: agent_id.to_string(),
            metadata: metadata.clone(),
        };
        let request = self
            .client
            .post(self.url("/calls/create-web-call"))
            .json(&body);
        let call: WebCall = self.send_json(request, "Failed to create web call").await?;

        info!("Web call created: {}", call.call_id);
        Ok(call)
    }

    pub async fn get_call(&self, call_id: &str) -> Result<CallDetails> {
        let request = self.client.get(self.url(&format!("/calls/{call_id}")));
        self.send_json(request, &format!("Failed to fetch call {call_id}"))
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a JSON body, preferring the server's
    /// `detail` message over `fallback` when the request fails.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        fallback: &str,
    ) -> Result<T> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Backend request failed: {}", e);
                return Err(anyhow!("{fallback}"));
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| fallback.to_string())?;

        if !status.is_success() {
            log_status(status, &body);
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.detail)
                .unwrap_or_else(|| fallback.to_string());
            return Err(anyhow!(detail));
        }

        serde_json::from_str(&body).with_context(|| format!("{fallback}: malformed response"))
    }
}

fn log_status(status: StatusCode, body: &str) {
    match status {
        StatusCode::UNAUTHORIZED => error!("Unauthorized: check the API key configuration"),
        StatusCode::NOT_FOUND => error!("Resource not found: {}", body),
        s if s.is_server_error() => error!("Server error {}: {}", s, body),
        s => error!("Backend request failed with status {}: {}", s, body),
    }
}

#[async_trait]
impl CallProvisioner for BackendClient {
    async fn create_web_call(
        &self,
        agent_id: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<WebCall> {
        self.create_call(agent_id, metadata).await
    }
}

#[async_trait]
impl AgentDirectory for BackendClient {
    async fn list_agents(&self) -> Result<Vec<AgentSummary>> {
        Ok(self.get_agents().await?.agents)
    }
}
