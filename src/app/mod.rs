use crate::api::ApiServer;
use crate::backend::BackendClient;
use crate::config::Config;
use crate::session::{CallController, CallControllerHandle, ControllerOptions};
use crate::transport::{CpalMicrophone, RawEventReceiver, RealtimeClient, TransportAdapter};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub async fn run_server(config: &Config) -> Result<()> {
    info!("Starting webcall provisioning server");
    ApiServer::new(&config.server)?.start().await
}

/// Wire a call controller for `client`: provisioning through the configured
/// backend, microphone checks through the configured capture device.
pub fn spawn_call_controller(
    config: &Config,
    client: Arc<dyn RealtimeClient>,
    raw_events: RawEventReceiver,
) -> Result<CallControllerHandle> {
    let backend = BackendClient::new(&config.backend.url, config.backend.request_timeout())?;
    let microphone = CpalMicrophone::new(config.call.capture_device.clone());

    let adapter = TransportAdapter::new(client, Arc::new(microphone), raw_events)
        .with_capture_device(config.call.capture_device.clone());

    info!("Call controller ready");
    Ok(CallController::spawn(
        Arc::new(adapter),
        Arc::new(backend),
        ControllerOptions::from(&config.call),
    ))
}
