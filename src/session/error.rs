use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Please select an agent first")]
    NoAgentSelected,

    #[error("Cannot change agent or start a call during an active call")]
    CallInProgress,

    #[error("Microphone permission is required for voice calls")]
    PermissionDenied,

    #[error("No active call")]
    NoActiveCall,

    #[error("{0}")]
    Provisioning(String),

    #[error("Timed out connecting to the call")]
    ConnectTimeout,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Call controller is no longer running")]
    ControllerClosed,
}
