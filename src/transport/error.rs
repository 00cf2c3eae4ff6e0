use thiserror::Error;

/// Failures reported by [`TransportAdapter`](super::TransportAdapter) commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Already connected to a call")]
    AlreadyConnected,

    #[error("No active call")]
    NoActiveCall,

    #[error("Connection was cancelled by a disconnect request")]
    ConnectCancelled,

    #[error("Transport client error: {0}")]
    Client(String),
}

impl TransportError {
    pub(crate) fn client(err: anyhow::Error) -> Self {
        Self::Client(format!("{err:#}"))
    }
}
