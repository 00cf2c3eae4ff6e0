//! Wire types shared by the backend client and the proxy server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub agent_name: String,
    pub voice_id: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentList {
    #[serde(default)]
    pub agents: Vec<AgentSummary>,
    #[serde(default)]
    pub count: usize,
}

impl AgentList {
    pub fn new(agents: Vec<AgentSummary>) -> Self {
        let count = agents.len();
        Self { agents, count }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWebCallRequest {
    pub agent_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Provisioned web call: the short-lived credentials for joining it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebCall {
    pub call_id: String,
    pub access_token: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallDetails {
    pub call_id: String,
    pub agent_id: Option<String>,
    pub call_status: Option<String>,
    pub start_timestamp: Option<i64>,
    pub end_timestamp: Option<i64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    #[serde(alias = "healthy")]
    Ok,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: ServiceHealth,
    #[serde(default)]
    pub api_key_configured: bool,
}

impl HealthStatus {
    /// Whether call-start controls should be enabled.
    pub fn allows_calls(&self) -> bool {
        self.status == ServiceHealth::Ok && self.api_key_configured
    }
}
