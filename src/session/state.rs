//! Call session status types.

use serde::{Deserialize, Serialize};

use crate::backend::HealthStatus;

/// Phase of a call session lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Ending,
    Ended,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Ending => "ending",
            Self::Ended => "ended",
            Self::Error => "error",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Ready to Call",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Ending => "Ending Call...",
            Self::Ended => "Call Ended",
            Self::Error => "Error",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Select an agent and start a call",
            Self::Connecting => "Establishing connection with the AI agent",
            Self::Connected => "Voice call is active",
            Self::Ending => "Disconnecting from the call",
            Self::Ended => "Call completed successfully",
            Self::Error => "Something went wrong with the call",
        }
    }

    /// Whether a call id is held in this phase.
    pub fn holds_call(&self) -> bool {
        matches!(self, Self::Connected | Self::Ending)
    }
}

/// Live speech indicators for both parties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talking {
    pub user: bool,
    pub agent: bool,
}

/// Observable state of one call session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    pub status: CallStatus,
    pub call_id: Option<String>,
    pub duration_seconds: u64,
    pub last_error: Option<String>,
    pub is_muted: bool,
    pub talking: Talking,
    pub selected_agent: Option<String>,
}

impl CallSession {
    pub fn is_connected(&self) -> bool {
        self.status == CallStatus::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.status == CallStatus::Connecting
    }

    pub fn has_error(&self) -> bool {
        self.status == CallStatus::Error || self.last_error.is_some()
    }

    /// Call duration as `m:ss`.
    pub fn formatted_duration(&self) -> String {
        format!(
            "{}:{:02}",
            self.duration_seconds / 60,
            self.duration_seconds % 60
        )
    }

    /// Whether the start control should be enabled, given the latest
    /// backend health probe.
    pub fn can_start(&self, health: Option<&HealthStatus>) -> bool {
        self.status == CallStatus::Idle
            && self.selected_agent.is_some()
            && health.map(HealthStatus::allows_calls).unwrap_or(false)
    }

    /// Structural invariants that hold after every transition.
    pub fn invariants_hold(&self) -> bool {
        let call_id_matches = self.call_id.is_some() == self.status.holds_call();
        let off_call_clear = self.status == CallStatus::Connected
            || (self.duration_seconds == 0 && self.talking == Talking::default());
        call_id_matches && off_call_clear
    }
}
