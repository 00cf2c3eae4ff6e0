//! Realtime call client abstraction.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::event::RawTransportEvent;

pub type RawEventSender = mpsc::UnboundedSender<RawTransportEvent>;
pub type RawEventReceiver = mpsc::UnboundedReceiver<RawTransportEvent>;

/// Channel a realtime client reports its events on.
pub fn raw_event_channel() -> (RawEventSender, RawEventReceiver) {
    mpsc::unbounded_channel()
}

/// Parameters handed to the realtime client when joining a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCallConfig {
    pub access_token: String,
    pub sample_rate: u32,
    pub capture_device_id: Option<String>,
}

/// Realtime voice client (audio, signaling and network live behind this).
///
/// Implementations emit their events on the [`RawEventSender`] they were
/// built with; the adapter owns the receiving end.
#[async_trait]
pub trait RealtimeClient: Send + Sync {
    async fn start_call(&self, config: StartCallConfig) -> Result<()>;

    async fn stop_call(&self) -> Result<()>;

    async fn is_muted(&self) -> Result<bool>;

    async fn set_muted(&self, muted: bool) -> Result<()>;

    /// Output volume as a fraction in `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<()>;
}
