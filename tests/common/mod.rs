//! Fakes shared by the integration tests.
#![allow(dead_code)]

pub mod platform;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use webcall::backend::{CallProvisioner, WebCall};
use webcall::session::{
    CallController, CallControllerHandle, CallSession, CallStatus, ControllerOptions,
    StartRequest,
};
use webcall::transport::{
    raw_event_channel, MicrophoneProbe, RawEventSender, RawTransportEvent, RealtimeClient,
    StartCallConfig, TransportAdapter,
};

pub const CALL_ID: &str = "call_42";

/// Realtime client that reports call start and end like a well-behaved
/// transport.
pub struct FakeClient {
    events: RawEventSender,
    announce_start: bool,
    gate: Option<Arc<Notify>>,
    fail_start: bool,
    muted: AtomicBool,
    volumes: Mutex<Vec<f32>>,
    starts: Mutex<Vec<StartCallConfig>>,
    stops: AtomicUsize,
}

impl FakeClient {
    pub fn new(events: RawEventSender) -> Self {
        Self {
            events,
            announce_start: true,
            gate: None,
            fail_start: false,
            muted: AtomicBool::new(false),
            volumes: Mutex::new(Vec::new()),
            starts: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        }
    }

    /// Emit an event as the transport would.
    pub fn emit(&self, event: &str) {
        let _ = self.events.send(RawTransportEvent::bare(event));
    }

    pub fn emit_with(&self, event: &str, payload: serde_json::Value) {
        let _ = self.events.send(RawTransportEvent::new(event, payload));
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.volumes.lock().unwrap().clone()
    }

    pub fn starts(&self) -> Vec<StartCallConfig> {
        self.starts.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeClient for FakeClient {
    async fn start_call(&self, config: StartCallConfig) -> Result<()> {
        self.starts.lock().unwrap().push(config);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_start {
            return Err(anyhow!("signaling refused"));
        }
        if self.announce_start {
            // Call id comes from the provisioning hint.
            self.emit("call_started");
        }
        Ok(())
    }

    async fn stop_call(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.emit("call_ended");
        Ok(())
    }

    async fn is_muted(&self) -> Result<bool> {
        Ok(self.muted.load(Ordering::SeqCst))
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        self.volumes.lock().unwrap().push(volume);
        Ok(())
    }
}

pub struct FakeMicrophone(pub bool);

#[async_trait]
impl MicrophoneProbe for FakeMicrophone {
    async fn probe(&self) -> Result<()> {
        if self.0 {
            Ok(())
        } else {
            Err(anyhow!("permission denied by user"))
        }
    }
}

#[derive(Default)]
pub struct FakeProvisioner {
    pub error: Option<String>,
    pub gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<(String, HashMap<String, String>)>>,
}

impl FakeProvisioner {
    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Provisioning waits on `gate` before answering.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, HashMap<String, String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallProvisioner for FakeProvisioner {
    async fn create_web_call(
        &self,
        agent_id: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<WebCall> {
        self.calls
            .lock()
            .unwrap()
            .push((agent_id.to_string(), metadata.clone()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.error {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(WebCall {
                call_id: CALL_ID.to_string(),
                access_token: "tok".to_string(),
                sample_rate: 24000,
            }),
        }
    }
}

/// Knobs for [`Harness::start`].
pub struct Setup {
    pub microphone_allowed: bool,
    pub announce_start: bool,
    pub fail_start: bool,
    pub client_gate: Option<Arc<Notify>>,
    pub provisioner: FakeProvisioner,
    pub options: ControllerOptions,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            microphone_allowed: true,
            announce_start: true,
            fail_start: false,
            client_gate: None,
            provisioner: FakeProvisioner::default(),
            options: ControllerOptions::default(),
        }
    }
}

pub struct Harness {
    pub handle: CallControllerHandle,
    pub client: Arc<FakeClient>,
    pub provisioner: Arc<FakeProvisioner>,
    pub adapter: Arc<TransportAdapter>,
    pub state: watch::Receiver<CallSession>,
}

impl Harness {
    pub fn start(setup: Setup) -> Self {
        let (tx, rx) = raw_event_channel();
        let mut client = FakeClient::new(tx);
        client.announce_start = setup.announce_start;
        client.fail_start = setup.fail_start;
        client.gate = setup.client_gate;
        let client = Arc::new(client);

        let adapter = Arc::new(TransportAdapter::new(
            client.clone(),
            Arc::new(FakeMicrophone(setup.microphone_allowed)),
            rx,
        ));
        let provisioner = Arc::new(setup.provisioner);
        let handle = CallController::spawn(adapter.clone(), provisioner.clone(), setup.options);
        let state = handle.subscribe();

        Self {
            handle,
            client,
            provisioner,
            adapter,
            state,
        }
    }

    pub fn default_setup() -> Self {
        Self::start(Setup::default())
    }

    /// Wait until the published session satisfies `predicate`.
    pub async fn wait_until(
        &mut self,
        predicate: impl FnMut(&CallSession) -> bool,
    ) -> CallSession {
        tokio::time::timeout(Duration::from_secs(30), self.state.wait_for(predicate))
            .await
            .expect("timed out waiting for session state")
            .expect("controller stopped")
            .clone()
    }

    pub async fn wait_for_status(&mut self, status: CallStatus) -> CallSession {
        self.wait_until(|s| s.status == status).await
    }

    /// Select `agent_1`, start and wait for the call to connect.
    pub async fn connect(&mut self) -> CallSession {
        self.handle.select_agent("agent_1").await.unwrap();
        self.handle
            .start(StartRequest::default())
            .await
            .unwrap();
        self.wait_for_status(CallStatus::Connected).await
    }

    pub fn emit(&self, event: &str) {
        self.client.emit(event);
    }

    pub fn emit_error(&self, message: &str) {
        self.client.emit_with("error", json!({ "error": message }));
    }
}
