//! Transport event vocabulary.
//!
//! Realtime clients report events as a wire name plus a loosely shaped JSON
//! payload. [`normalize`] turns those into the closed [`TransportEvent`] enum
//! that the session controller consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";

/// Normalized transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    CallStarted { call_id: String },
    CallEnded,
    Error { message: String },
    UserStartTalking,
    UserStopTalking,
    AgentStartTalking,
    AgentStopTalking,
}

impl TransportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallStarted { .. } => "callStarted",
            Self::CallEnded => "callEnded",
            Self::Error { .. } => "error",
            Self::UserStartTalking => "userStartTalking",
            Self::UserStopTalking => "userStopTalking",
            Self::AgentStartTalking => "agentStartTalking",
            Self::AgentStopTalking => "agentStopTalking",
        }
    }
}

/// Event exactly as emitted by a realtime client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransportEvent {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl RawTransportEvent {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Event without a payload.
    pub fn bare(event: impl Into<String>) -> Self {
        Self::new(event, Value::Null)
    }
}

/// Normalize a raw client event.
///
/// `fallback_call_id` is used when a call-started event carries no id of its
/// own. Returns `None` for events the controller has no use for (`update`,
/// unknown names).
pub fn normalize(
    raw: &RawTransportEvent,
    fallback_call_id: Option<&str>,
) -> Option<TransportEvent> {
    let event = match canonical_name(&raw.event).as_str() {
        "callstarted" => match string_field(&raw.payload, &["call_id", "callId"])
            .or_else(|| fallback_call_id.map(str::to_string))
        {
            Some(call_id) => TransportEvent::CallStarted { call_id },
            None => TransportEvent::Error {
                message: "call started without a call id".to_string(),
            },
        },
        "callended" => TransportEvent::CallEnded,
        "error" => TransportEvent::Error {
            message: error_message(&raw.payload),
        },
        "userstarttalking" => TransportEvent::UserStartTalking,
        "userstoptalking" => TransportEvent::UserStopTalking,
        "agentstarttalking" => TransportEvent::AgentStartTalking,
        "agentstoptalking" => TransportEvent::AgentStopTalking,
        _ => return None,
    };
    Some(event)
}

fn canonical_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn string_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| payload.get(key))
        .filter_map(Value::as_str)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn error_message(payload: &Value) -> String {
    if let Some(message) = string_field(payload, &["error", "message"]) {
        return message;
    }
    match payload {
        Value::String(message) if !message.is_empty() => message.clone(),
        _ => DEFAULT_ERROR_MESSAGE.to_string(),
    }
}
