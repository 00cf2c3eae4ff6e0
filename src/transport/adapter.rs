//! Transport adapter.
//!
//! Wraps a [`RealtimeClient`] and its raw event stream. The adapter tracks
//! only whether a transport session is open and which call it belongs to;
//! everything else about the session lives in the controller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::client::{RawEventReceiver, RealtimeClient, StartCallConfig};
use super::error::TransportError;
use super::event::{normalize, TransportEvent};
use super::microphone::MicrophoneProbe;

/// Identifies one subscription for [`TransportAdapter::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving side of a subscription; events arrive in emission order.
pub struct TransportSubscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Credentials returned by provisioning, used to join the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub access_token: String,
    pub sample_rate: u32,
    /// Call id from provisioning; used when the client omits it from its
    /// call-started event.
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    Disconnected,
    /// No transport session was open.
    NotConnected,
    /// A connect is still in flight; the disconnect is applied when it resolves.
    Deferred,
}

#[derive(Debug, Default)]
struct LinkState {
    connecting: bool,
    disconnect_requested: bool,
    /// A connect future was dropped while the client was still starting.
    abandoned: bool,
    session_open: bool,
    call_id: Option<String>,
    call_id_hint: Option<String>,
}

#[derive(Default)]
struct Shared {
    link: Mutex<LinkState>,
    subscribers: Mutex<Vec<(SubscriptionId, mpsc::UnboundedSender<TransportEvent>)>>,
    next_subscription: AtomicU64,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscribers(
        &self,
    ) -> MutexGuard<'_, Vec<(SubscriptionId, mpsc::UnboundedSender<TransportEvent>)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dispatch(&self, event: TransportEvent) {
        let mut subscribers = self.subscribers();
        subscribers.retain(|(id, tx)| {
            let delivered = tx.send(event.clone()).is_ok();
            if !delivered {
                debug!("Dropping closed transport subscription {:?}", id);
            }
            delivered
        });
    }
}

pub struct TransportAdapter {
    client: Arc<dyn RealtimeClient>,
    microphone: Arc<dyn MicrophoneProbe>,
    capture_device_id: Option<String>,
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

impl TransportAdapter {
    /// Build an adapter over `client`, consuming the raw events it emits.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        client: Arc<dyn RealtimeClient>,
        microphone: Arc<dyn MicrophoneProbe>,
        raw_events: RawEventReceiver,
    ) -> Self {
        let shared = Arc::new(Shared::default());
        let pump = tokio::spawn(run_event_pump(shared.clone(), raw_events));

        Self {
            client,
            microphone,
            capture_device_id: None,
            shared,
            pump,
        }
    }

    pub fn with_capture_device(mut self, device_id: Option<String>) -> Self {
        self.capture_device_id = device_id;
        self
    }

    pub fn subscribe(&self) -> TransportSubscription {
        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::Relaxed));
        let (tx, events) = mpsc::unbounded_channel();
        self.shared.subscribers().push((id, tx));
        TransportSubscription { id, events }
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.shared.subscribers();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link().session_open
    }

    pub fn active_call_id(&self) -> Option<String> {
        self.shared.link().call_id.clone()
    }

    /// Returns false on denial or when no capture device exists; never errors.
    pub async fn check_microphone_permission(&self) -> bool {
        match self.microphone.probe().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Microphone permission denied: {:#}", e);
                false
            }
        }
    }

    pub async fn connect(&self, request: ConnectRequest) -> Result<(), TransportError> {
        {
            let mut link = self.shared.link();
            if link.connecting || link.session_open {
                warn!("Connect requested while a transport session is active");
                return Err(TransportError::AlreadyConnected);
            }
            link.connecting = true;
            link.disconnect_requested = false;
            link.abandoned = false;
            link.call_id_hint = request.call_id.clone();
        }
        let guard = ConnectingGuard {
            shared: &self.shared,
            armed: true,
        };

        info!(
            "Starting transport call (sample rate {} Hz)",
            request.sample_rate
        );
        let result = self
            .client
            .start_call(StartCallConfig {
                access_token: request.access_token,
                sample_rate: request.sample_rate,
                capture_device_id: self.capture_device_id.clone(),
            })
            .await;

        let cancelled = {
            let mut link = guard.disarm();
            link.connecting = false;
            let cancelled = std::mem::take(&mut link.disconnect_requested);
            if result.is_ok() {
                link.session_open = true;
            } else {
                link.call_id_hint = None;
            }
            cancelled
        };

        match result {
            Err(e) => {
                error!("Failed to start transport call: {:#}", e);
                Err(TransportError::client(e))
            }
            Ok(()) if cancelled => {
                info!("Applying disconnect requested while connecting");
                if let Err(e) = self.client.stop_call().await {
                    warn!("Failed to stop cancelled transport call: {:#}", e);
                }
                self.close_session();
                Err(TransportError::ConnectCancelled)
            }
            Ok(()) => Ok(()),
        }
    }

    pub async fn disconnect(&self) -> Result<DisconnectOutcome, TransportError> {
        {
            let mut link = self.shared.link();
            if link.connecting {
                info!("Disconnect requested while connecting, deferring");
                link.disconnect_requested = true;
                return Ok(DisconnectOutcome::Deferred);
            }
            if !link.session_open && !std::mem::take(&mut link.abandoned) {
                warn!("No active call to stop");
                return Ok(DisconnectOutcome::NotConnected);
            }
        }

        self.client.stop_call().await.map_err(|e| {
            error!("Failed to stop transport call: {:#}", e);
            TransportError::client(e)
        })?;
        self.close_session();

        info!("Transport call stopped");
        Ok(DisconnectOutcome::Disconnected)
    }

    /// Flip the microphone mute state, returning the new state.
    pub async fn toggle_mute(&self) -> Result<bool, TransportError> {
        self.require_session()?;

        let muted = self
            .client
            .is_muted()
            .await
            .map_err(TransportError::client)?;
        self.client
            .set_muted(!muted)
            .await
            .map_err(TransportError::client)?;

        debug!("Microphone muted: {}", !muted);
        Ok(!muted)
    }

    /// Set output volume. Out-of-range input is clamped into `0.0..=1.0`.
    pub async fn set_volume(&self, volume: f32) -> Result<(), TransportError> {
        self.require_session()?;

        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.client
            .set_volume(volume)
            .await
            .map_err(TransportError::client)?;

        debug!("Output volume set to {:.2}", volume);
        Ok(())
    }

    /// Disconnect if needed and drop every subscriber.
    pub async fn shutdown(&self) {
        if self.is_connected() {
            if let Err(e) = self.disconnect().await {
                warn!("Failed to disconnect during shutdown: {}", e);
            }
        }
        self.shared.subscribers().clear();
    }

    fn require_session(&self) -> Result<(), TransportError> {
        if self.shared.link().session_open {
            Ok(())
        } else {
            Err(TransportError::NoActiveCall)
        }
    }

    fn close_session(&self) {
        let mut link = self.shared.link();
        link.session_open = false;
        link.call_id = None;
        link.call_id_hint = None;
    }
}

/// Clears the connecting flag if a connect future is dropped mid-flight.
struct ConnectingGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn disarm(mut self) -> MutexGuard<'a, LinkState> {
        let shared = self.shared;
        self.armed = false;
        shared.link()
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Connect abandoned before it resolved");
            let mut link = self.shared.link();
            link.connecting = false;
            link.disconnect_requested = false;
            link.abandoned = true;
            link.call_id_hint = None;
        }
    }
}

impl Drop for TransportAdapter {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn run_event_pump(shared: Arc<Shared>, mut raw_events: RawEventReceiver) {
    while let Some(raw) = raw_events.recv().await {
        let hint = shared.link().call_id_hint.clone();
        let Some(event) = normalize(&raw, hint.as_deref()) else {
            debug!("Ignoring transport event {:?}", raw.event);
            continue;
        };

        match &event {
            TransportEvent::CallStarted { call_id } => {
                info!("Call started: {}", call_id);
                let mut link = shared.link();
                link.session_open = true;
                link.call_id = Some(call_id.clone());
            }
            TransportEvent::CallEnded => {
                info!("Call ended");
                let mut link = shared.link();
                link.session_open = false;
                link.call_id = None;
                link.call_id_hint = None;
            }
            TransportEvent::Error { message } => error!("Transport error: {}", message),
            other => debug!("Transport event: {}", other.name()),
        }

        shared.dispatch(event);
    }
    debug!("Transport event stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::client::{raw_event_channel, RawEventSender};
    use crate::transport::event::RawTransportEvent;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct StubClient {
        muted: Mutex<bool>,
        volumes: Mutex<Vec<f32>>,
        stops: AtomicU64,
        gate: Option<Arc<Notify>>,
        fail_start: bool,
    }

    #[async_trait]
    impl RealtimeClient for StubClient {
        async fn start_call(&self, _config: StartCallConfig) -> Result<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_start {
                return Err(anyhow!("signaling refused"));
            }
            Ok(())
        }

        async fn stop_call(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn is_muted(&self) -> Result<bool> {
            Ok(*self.muted.lock().unwrap())
        }

        async fn set_muted(&self, muted: bool) -> Result<()> {
            *self.muted.lock().unwrap() = muted;
            Ok(())
        }

        async fn set_volume(&self, volume: f32) -> Result<()> {
            self.volumes.lock().unwrap().push(volume);
            Ok(())
        }
    }

    struct AllowMic(bool);

    #[async_trait]
    impl MicrophoneProbe for AllowMic {
        async fn probe(&self) -> Result<()> {
            if self.0 {
                Ok(())
            } else {
                Err(anyhow!("NotAllowedError"))
            }
        }
    }

    fn adapter_with(client: Arc<StubClient>, mic: bool) -> (TransportAdapter, RawEventSender) {
        let (tx, rx) = raw_event_channel();
        (TransportAdapter::new(client, Arc::new(AllowMic(mic)), rx), tx)
    }

    fn request() -> ConnectRequest {
        ConnectRequest {
            access_token: "tok".to_string(),
            sample_rate: 24000,
            call_id: Some("call_1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_permission_probe_never_errors() {
        let (granted, _tx) = adapter_with(Arc::new(StubClient::default()), true);
        let (denied, _tx2) = adapter_with(Arc::new(StubClient::default()), false);

        assert!(granted.check_microphone_permission().await);
        assert!(!denied.check_microphone_permission().await);
    }

    #[tokio::test]
    async fn test_second_connect_is_rejected() {
        let (adapter, _tx) = adapter_with(Arc::new(StubClient::default()), true);

        adapter.connect(request()).await.unwrap();
        assert!(adapter.is_connected());
        assert_eq!(
            adapter.connect(request()).await,
            Err(TransportError::AlreadyConnected)
        );
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_adapter_idle() {
        let client = Arc::new(StubClient {
            fail_start: true,
            ..Default::default()
        });
        let (adapter, _tx) = adapter_with(client, true);

        let err = adapter.connect(request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Client(_)));
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_a_noop() {
        let client = Arc::new(StubClient::default());
        let (adapter, _tx) = adapter_with(client.clone(), true);

        assert_eq!(
            adapter.disconnect().await,
            Ok(DisconnectOutcome::NotConnected)
        );
        assert_eq!(client.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disconnect_during_connect_is_applied_on_resolve() {
        let gate = Arc::new(Notify::new());
        let client = Arc::new(StubClient {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let (adapter, _tx) = adapter_with(client.clone(), true);
        let adapter = Arc::new(adapter);

        let connecting = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.connect(request()).await })
        };
        tokio::task::yield_now().await;

        assert_eq!(adapter.disconnect().await, Ok(DisconnectOutcome::Deferred));
        gate.notify_one();

        assert_eq!(
            connecting.await.unwrap(),
            Err(TransportError::ConnectCancelled)
        );
        assert!(!adapter.is_connected());
        assert_eq!(client.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_stops_client_after_abandoned_connect() {
        let client = Arc::new(StubClient {
            gate: Some(Arc::new(Notify::new())),
            ..Default::default()
        });
        let (adapter, _tx) = adapter_with(client.clone(), true);

        let stuck = tokio::time::timeout(Duration::from_millis(20), adapter.connect(request()));
        assert!(stuck.await.is_err());
        assert!(!adapter.is_connected());

        assert_eq!(
            adapter.disconnect().await,
            Ok(DisconnectOutcome::Disconnected)
        );
        assert_eq!(client.stops.load(Ordering::SeqCst), 1);
        assert_eq!(
            adapter.disconnect().await,
            Ok(DisconnectOutcome::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_mute_and_volume_require_a_session() {
        let client = Arc::new(StubClient::default());
        let (adapter, _tx) = adapter_with(client.clone(), true);

        assert_eq!(adapter.toggle_mute().await, Err(TransportError::NoActiveCall));
        assert_eq!(adapter.set_volume(0.5).await, Err(TransportError::NoActiveCall));

        adapter.connect(request()).await.unwrap();
        assert_eq!(adapter.toggle_mute().await, Ok(true));
        assert_eq!(adapter.toggle_mute().await, Ok(false));
    }

    #[tokio::test]
    async fn test_volume_is_clamped_not_rejected() {
        let client = Arc::new(StubClient::default());
        let (adapter, _tx) = adapter_with(client.clone(), true);
        adapter.connect(request()).await.unwrap();

        adapter.set_volume(1.5).await.unwrap();
        adapter.set_volume(-0.2).await.unwrap();
        adapter.set_volume(f32::NAN).await.unwrap();

        assert_eq!(*client.volumes.lock().unwrap(), vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_events_fan_out_in_order_and_track_call_id() {
        let (adapter, tx) = adapter_with(Arc::new(StubClient::default()), true);
        let mut first = adapter.subscribe();
        let mut second = adapter.subscribe();

        tx.send(RawTransportEvent::new("call_started", json!({ "callId": "call_9" })))
            .unwrap();
        tx.send(RawTransportEvent::bare("agent_start_talking")).unwrap();
        tx.send(RawTransportEvent::bare("call_ended")).unwrap();

        for sub in [&mut first, &mut second] {
            assert_eq!(
                sub.events.recv().await,
                Some(TransportEvent::CallStarted {
                    call_id: "call_9".to_string()
                })
            );
            assert_eq!(sub.events.recv().await, Some(TransportEvent::AgentStartTalking));
            assert_eq!(sub.events.recv().await, Some(TransportEvent::CallEnded));
        }
        assert!(!adapter.is_connected());
        assert_eq!(adapter.active_call_id(), None);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_by_identity() {
        let (adapter, tx) = adapter_with(Arc::new(StubClient::default()), true);
        let mut kept = adapter.subscribe();
        let removed = adapter.subscribe();

        assert!(adapter.unsubscribe(removed.id));
        assert!(!adapter.unsubscribe(removed.id));

        tx.send(RawTransportEvent::bare("user_start_talking")).unwrap();
        assert_eq!(kept.events.recv().await, Some(TransportEvent::UserStartTalking));
    }
}
