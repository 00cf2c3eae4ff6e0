//! Call session controller.
//!
//! One task owns the [`CallSession`] and applies every transition. User
//! commands arrive through a [`CallControllerHandle`], transport events
//! through the adapter subscription, and the results of suspended work
//! (permission probe, provisioning, connect, disconnect, mute, volume) and
//! timer ticks through an internal channel. Commands issued while earlier
//! work is pending are answered by the state guards, never queued behind it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::backend::{AgentSummary, CallProvisioner, DEFAULT_SAMPLE_RATE};
use crate::config::CallConfig;
use crate::transport::{
    ConnectRequest, DisconnectOutcome, TransportAdapter, TransportError, TransportEvent,
    TransportSubscription,
};

use super::error::SessionError;
use super::state::{CallSession, CallStatus, Talking};
use super::timer::ScheduledTask;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    /// How long `Ended` is shown before returning to `Idle`.
    pub reset_delay: Duration,
    pub tick_interval: Duration,
    /// Upper bound on permission + provisioning + connect. `None` waits forever.
    pub connect_timeout: Option<Duration>,
    /// Used when the provisioned call reports a sample rate of zero.
    pub default_sample_rate: u32,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            reset_delay: Duration::from_secs(2),
            tick_interval: Duration::from_secs(1),
            connect_timeout: None,
            default_sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl From<&CallConfig> for ControllerOptions {
    fn from(config: &CallConfig) -> Self {
        Self {
            reset_delay: Duration::from_millis(config.reset_delay_ms),
            connect_timeout: config.connect_timeout_secs.map(Duration::from_secs),
            default_sample_rate: config.default_sample_rate,
            ..Self::default()
        }
    }
}

/// Parameters for [`CallControllerHandle::start`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartRequest {
    /// Agent to call; the current selection is used when `None`.
    pub agent_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl StartRequest {
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    SelectAgent { agent_id: String, reply: Reply<()> },
    OfferAgents {
        agents: Vec<AgentSummary>,
        reply: Reply<Option<String>>,
    },
    Start { request: StartRequest, reply: Reply<()> },
    End { reply: Reply<()> },
    ToggleMute { reply: Reply<bool> },
    SetVolume { percent: f32, reply: Reply<()> },
    ClearError { reply: Reply<()> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectReason {
    UserEnd,
    WhileConnecting,
    Cleanup,
}

enum Internal {
    StartFinished {
        attempt: u64,
        result: Result<(), SessionError>,
        reply: Reply<()>,
    },
    DisconnectFinished {
        reason: DisconnectReason,
        result: Result<DisconnectOutcome, TransportError>,
    },
    MuteToggled {
        result: Result<bool, TransportError>,
        reply: Reply<bool>,
    },
    VolumeSet {
        result: Result<(), TransportError>,
        reply: Reply<()>,
    },
    Tick { epoch: u64 },
    ResetElapsed { epoch: u64 },
}

pub struct CallController {
    session: CallSession,
    adapter: Arc<TransportAdapter>,
    provisioner: Arc<dyn CallProvisioner>,
    options: ControllerOptions,
    updates: watch::Sender<CallSession>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    attempt: u64,
    /// Set by `end()` while the current attempt is still connecting.
    end_requested: Arc<AtomicBool>,
    tick_epoch: u64,
    reset_epoch: u64,
    duration_timer: Option<ScheduledTask>,
    reset_timer: Option<ScheduledTask>,
}

impl CallController {
    /// Start the controller task. It runs until every handle is dropped.
    pub fn spawn(
        adapter: Arc<TransportAdapter>,
        provisioner: Arc<dyn CallProvisioner>,
        options: ControllerOptions,
    ) -> CallControllerHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (updates, state) = watch::channel(CallSession::default());
        let subscription = adapter.subscribe();

        let controller = Self {
            session: CallSession::default(),
            adapter,
            provisioner,
            options,
            updates,
            internal_tx,
            attempt: 0,
            end_requested: Arc::new(AtomicBool::new(false)),
            tick_epoch: 0,
            reset_epoch: 0,
            duration_timer: None,
            reset_timer: None,
        };
        tokio::spawn(controller.run(command_rx, internal_rx, subscription));

        CallControllerHandle {
            commands: command_tx,
            state,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        subscription: TransportSubscription,
    ) {
        let TransportSubscription {
            id: subscription_id,
            mut events,
        } = subscription;

        loop {
            tokio::select! {
                biased;
                Some(message) = internal.recv() => self.handle_internal(message),
                Some(event) = events.recv() => self.handle_event(event),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
            self.publish();
        }

        debug!("All controller handles dropped, shutting down");
        self.duration_timer.take();
        self.reset_timer.take();
        self.adapter.unsubscribe(subscription_id);
        self.adapter.shutdown().await;
    }

    fn publish(&self) {
        debug_assert!(
            self.session.invariants_hold(),
            "call session invariants violated: {:?}",
            self.session
        );
        self.updates.send_if_modified(|current| {
            if *current == self.session {
                false
            } else {
                *current = self.session.clone();
                true
            }
        });
    }

    /// Publish the current state, then answer the caller.
    fn respond<T>(&self, reply: Reply<T>, result: Result<T, SessionError>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SelectAgent { agent_id, reply } => {
                let result = self.select_agent(agent_id);
                self.respond(reply, result);
            }
            Command::OfferAgents { agents, reply } => {
                let result = self.offer_agents(&agents);
                self.respond(reply, result);
            }
            Command::Start { request, reply } => self.start(request, reply),
            Command::End { reply } => {
                let result = self.end();
                self.respond(reply, result);
            }
            Command::ToggleMute { reply } => self.toggle_mute(reply),
            Command::SetVolume { percent, reply } => self.set_volume(percent, reply),
            Command::ClearError { reply } => {
                self.clear_error();
                self.respond(reply, Ok(()));
            }
        }
    }

    fn select_agent(&mut self, agent_id: String) -> Result<(), SessionError> {
        if self.session.status != CallStatus::Idle {
            warn!(
                "Agent change to {} rejected while {}",
                agent_id,
                self.session.status.as_str()
            );
            return Err(SessionError::CallInProgress);
        }
        info!("Selected agent {}", agent_id);
        self.session.selected_agent = Some(agent_id);
        Ok(())
    }

    fn offer_agents(&mut self, agents: &[AgentSummary]) -> Result<Option<String>, SessionError> {
        if self.session.selected_agent.is_none() && self.session.status == CallStatus::Idle {
            if let Some(first) = agents.first() {
                info!("Auto-selecting agent {} ({})", first.agent_name, first.agent_id);
                self.session.selected_agent = Some(first.agent_id.clone());
            }
        }
        Ok(self.session.selected_agent.clone())
    }

    fn start(&mut self, request: StartRequest, reply: Reply<()>) {
        if self.session.status != CallStatus::Idle {
            warn!(
                "Start rejected while {}",
                self.session.status.as_str()
            );
            self.respond(reply, Err(SessionError::CallInProgress));
            return;
        }

        let Some(agent_id) = request
            .agent_id
            .or_else(|| self.session.selected_agent.clone())
        else {
            warn!("Start rejected: no agent selected");
            self.respond(reply, Err(SessionError::NoAgentSelected));
            return;
        };

        info!("Starting call with agent {}", agent_id);
        self.session.selected_agent = Some(agent_id.clone());
        self.session.status = CallStatus::Connecting;
        self.session.last_error = None;
        self.session.is_muted = false;
        self.attempt += 1;
        self.end_requested = Arc::new(AtomicBool::new(false));

        let attempt = self.attempt;
        let end_requested = self.end_requested.clone();
        let adapter = self.adapter.clone();
        let provisioner = self.provisioner.clone();
        let metadata = request.metadata;
        let connect_timeout = self.options.connect_timeout;
        let default_sample_rate = self.options.default_sample_rate;
        let tx = self.internal_tx.clone();

        tokio::spawn(async move {
            let pipeline = run_start_pipeline(
                adapter,
                provisioner,
                agent_id,
                metadata,
                default_sample_rate,
                end_requested,
            );
            let result = match connect_timeout {
                Some(limit) => tokio::time::timeout(limit, pipeline)
                    .await
                    .unwrap_or(Err(SessionError::ConnectTimeout)),
                None => pipeline.await,
            };
            let _ = tx.send(Internal::StartFinished {
                attempt,
                result,
                reply,
            });
        });
    }

    fn end(&mut self) -> Result<(), SessionError> {
        match self.session.status {
            CallStatus::Connected => {
                info!("Ending call");
                self.leave_connected();
                self.session.status = CallStatus::Ending;
                self.spawn_disconnect(DisconnectReason::UserEnd);
                Ok(())
            }
            CallStatus::Connecting => {
                info!("End requested while connecting, requesting disconnect");
                self.end_requested.store(true, Ordering::SeqCst);
                self.spawn_disconnect(DisconnectReason::WhileConnecting);
                Ok(())
            }
            CallStatus::Ending => Ok(()),
            _ => Err(SessionError::NoActiveCall),
        }
    }

    fn toggle_mute(&mut self, reply: Reply<bool>) {
        if self.session.status != CallStatus::Connected {
            self.respond(reply, Err(SessionError::NoActiveCall));
            return;
        }

        let adapter = self.adapter.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = adapter.toggle_mute().await;
            let _ = tx.send(Internal::MuteToggled { result, reply });
        });
    }

    /// `percent` is on the 0-100 scale; the adapter clamps the fraction.
    fn set_volume(&mut self, percent: f32, reply: Reply<()>) {
        if self.session.status != CallStatus::Connected {
            self.respond(reply, Err(SessionError::NoActiveCall));
            return;
        }

        let adapter = self.adapter.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = adapter.set_volume(percent / 100.0).await;
            let _ = tx.send(Internal::VolumeSet { result, reply });
        });
    }

    fn clear_error(&mut self) {
        self.session.last_error = None;
        if self.session.status == CallStatus::Error {
            info!("Error cleared, returning to idle");
            self.session.status = CallStatus::Idle;
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::StartFinished {
                attempt,
                result,
                reply,
            } => {
                let result = self.on_start_finished(attempt, result);
                self.respond(reply, result);
            }
            Internal::DisconnectFinished { reason, result } => {
                self.on_disconnect_finished(reason, result)
            }
            Internal::MuteToggled { result, reply } => {
                let result = match result {
                    Ok(muted) => {
                        if self.session.status == CallStatus::Connected {
                            self.session.is_muted = muted;
                        }
                        Ok(muted)
                    }
                    Err(e) => Err(self.command_failed("toggle mute", e)),
                };
                self.respond(reply, result);
            }
            Internal::VolumeSet { result, reply } => {
                let result = result.map_err(|e| self.command_failed("set volume", e));
                self.respond(reply, result);
            }
            Internal::Tick { epoch } => {
                if epoch == self.tick_epoch && self.session.status == CallStatus::Connected {
                    self.session.duration_seconds += 1;
                }
            }
            Internal::ResetElapsed { epoch } => {
                if epoch == self.reset_epoch && self.session.status == CallStatus::Ended {
                    debug!("Returning to idle after call end");
                    self.session.status = CallStatus::Idle;
                    self.reset_timer = None;
                }
            }
        }
    }

    fn on_start_finished(
        &mut self,
        attempt: u64,
        result: Result<(), SessionError>,
    ) -> Result<(), SessionError> {
        let current = attempt == self.attempt;
        let status = self.session.status;

        match &result {
            Ok(()) => {
                if current
                    && status == CallStatus::Connecting
                    && self.end_requested.load(Ordering::SeqCst)
                {
                    // The end request raced the connect and found nothing to stop.
                    info!("Connect resolved after end was requested, stopping call");
                    self.finish_call();
                    self.spawn_disconnect(DisconnectReason::Cleanup);
                    return Err(TransportError::ConnectCancelled.into());
                }
                debug!("Transport connect resolved");
            }
            Err(SessionError::Transport(TransportError::ConnectCancelled)) => {
                if current
                    && matches!(
                        status,
                        CallStatus::Connecting | CallStatus::Connected | CallStatus::Ending
                    )
                {
                    info!("Connect cancelled by end request");
                    self.finish_call();
                }
            }
            Err(e) => {
                if current && status == CallStatus::Connecting {
                    error!("Failed to start call: {}", e);
                    self.fail(e.to_string());
                } else {
                    warn!(
                        "Start attempt {} failed after the session moved to {}: {}",
                        attempt,
                        status.as_str(),
                        e
                    );
                }
                if *e == SessionError::ConnectTimeout {
                    self.spawn_disconnect(DisconnectReason::Cleanup);
                }
            }
        }
        result
    }

    fn on_disconnect_finished(
        &mut self,
        reason: DisconnectReason,
        result: Result<DisconnectOutcome, TransportError>,
    ) {
        match result {
            Ok(outcome) => debug!("Disconnect ({:?}) finished: {:?}", reason, outcome),
            Err(e) => {
                if reason == DisconnectReason::UserEnd && self.session.status == CallStatus::Ending
                {
                    error!("Failed to end call: {}", e);
                    self.fail(e.to_string());
                } else {
                    warn!("Disconnect ({:?}) failed: {}", reason, e);
                }
            }
        }
    }

    fn command_failed(&mut self, command: &str, err: TransportError) -> SessionError {
        error!("Failed to {}: {}", command, err);
        self.session.last_error = Some(err.to_string());
        SessionError::Transport(err)
    }

    fn handle_event(&mut self, event: TransportEvent) {
        let status = self.session.status;
        match event {
            TransportEvent::CallStarted { call_id } => match status {
                CallStatus::Connecting if self.end_requested.load(Ordering::SeqCst) => {
                    info!("Ignoring call start for {} after end was requested", call_id)
                }
                CallStatus::Connecting => {
                    info!("Call connected: {}", call_id);
                    self.session.status = CallStatus::Connected;
                    self.session.call_id = Some(call_id);
                    self.session.last_error = None;
                    self.session.duration_seconds = 0;
                    self.start_duration_timer();
                }
                _ => warn!(
                    "Ignoring call start for {} while {}",
                    call_id,
                    status.as_str()
                ),
            },
            TransportEvent::CallEnded => match status {
                CallStatus::Connecting | CallStatus::Connected | CallStatus::Ending => {
                    self.finish_call()
                }
                _ => debug!("Ignoring call end while {}", status.as_str()),
            },
            TransportEvent::Error { message } => match status {
                CallStatus::Connecting | CallStatus::Connected | CallStatus::Ending => {
                    error!("Call error: {}", message);
                    self.fail(message);
                    self.spawn_disconnect(DisconnectReason::Cleanup);
                }
                _ => warn!(
                    "Ignoring transport error while {}: {}",
                    status.as_str(),
                    message
                ),
            },
            TransportEvent::UserStartTalking => self.set_talking(|t| t.user = true),
            TransportEvent::UserStopTalking => self.set_talking(|t| t.user = false),
            TransportEvent::AgentStartTalking => self.set_talking(|t| t.agent = true),
            TransportEvent::AgentStopTalking => self.set_talking(|t| t.agent = false),
        }
    }

    fn set_talking(&mut self, apply: impl FnOnce(&mut Talking)) {
        if self.session.status == CallStatus::Connected {
            apply(&mut self.session.talking);
        }
    }

    /// Any transport-reported end of the call, user-initiated or not.
    fn finish_call(&mut self) {
        info!("Call ended");
        self.leave_connected();
        self.session.status = CallStatus::Ended;
        self.session.call_id = None;
        self.schedule_reset();
    }

    fn fail(&mut self, message: String) {
        self.leave_connected();
        self.session.status = CallStatus::Error;
        self.session.call_id = None;
        self.session.last_error = Some(message);
    }

    /// Stop the duration timer and clear the in-call indicators.
    fn leave_connected(&mut self) {
        if let Some(timer) = self.duration_timer.take() {
            timer.cancel();
        }
        self.session.duration_seconds = 0;
        self.session.talking = Talking::default();
    }

    fn start_duration_timer(&mut self) {
        self.tick_epoch += 1;
        let epoch = self.tick_epoch;
        self.duration_timer = Some(ScheduledTask::repeating(
            self.options.tick_interval,
            self.internal_tx.clone(),
            move || Internal::Tick { epoch },
        ));
    }

    fn schedule_reset(&mut self) {
        self.reset_epoch += 1;
        let epoch = self.reset_epoch;
        self.reset_timer = Some(ScheduledTask::once(
            self.options.reset_delay,
            self.internal_tx.clone(),
            move || Internal::ResetElapsed { epoch },
        ));
    }

    fn spawn_disconnect(&self, reason: DisconnectReason) {
        let adapter = self.adapter.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = adapter.disconnect().await;
            let _ = tx.send(Internal::DisconnectFinished { reason, result });
        });
    }
}

async fn run_start_pipeline(
    adapter: Arc<TransportAdapter>,
    provisioner: Arc<dyn CallProvisioner>,
    agent_id: String,
    metadata: HashMap<String, String>,
    default_sample_rate: u32,
    end_requested: Arc<AtomicBool>,
) -> Result<(), SessionError> {
    let cancelled = || {
        if end_requested.load(Ordering::SeqCst) {
            info!("Start abandoned: end requested before connecting");
            Err(SessionError::from(TransportError::ConnectCancelled))
        } else {
            Ok(())
        }
    };

    if !adapter.check_microphone_permission().await {
        return Err(SessionError::PermissionDenied);
    }
    cancelled()?;

    let call = provisioner
        .create_web_call(&agent_id, &metadata)
        .await
        .map_err(|e| {
            let message = e.to_string();
            if message.trim().is_empty() {
                SessionError::Provisioning("Failed to create web call".to_string())
            } else {
                SessionError::Provisioning(message)
            }
        })?;
    info!("Web call provisioned: {}", call.call_id);
    cancelled()?;

    adapter
        .connect(ConnectRequest {
            access_token: call.access_token,
            sample_rate: if call.sample_rate == 0 {
                default_sample_rate
            } else {
                call.sample_rate
            },
            call_id: Some(call.call_id),
        })
        .await?;
    Ok(())
}

/// Cloneable front end of a running [`CallController`].
#[derive(Clone)]
pub struct CallControllerHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<CallSession>,
}

impl CallControllerHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::ControllerClosed)?;
        response.await.map_err(|_| SessionError::ControllerClosed)?
    }

    /// Choose the agent for the next call. Rejected unless idle.
    pub async fn select_agent(&self, agent_id: impl Into<String>) -> Result<(), SessionError> {
        let agent_id = agent_id.into();
        self.request(|reply| Command::SelectAgent { agent_id, reply })
            .await
    }

    /// Report a freshly loaded agent list. The first agent is selected when
    /// nothing is selected yet. Returns the selection.
    pub async fn offer_agents(
        &self,
        agents: Vec<AgentSummary>,
    ) -> Result<Option<String>, SessionError> {
        self.request(|reply| Command::OfferAgents { agents, reply })
            .await
    }

    /// Start a call. Resolves once the transport connect attempt resolves;
    /// the session becomes `Connected` when the transport reports the call.
    pub async fn start(&self, request: StartRequest) -> Result<(), SessionError> {
        self.request(|reply| Command::Start { request, reply }).await
    }

    pub async fn end(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::End { reply }).await
    }

    /// Returns the new muted state.
    pub async fn toggle_mute(&self) -> Result<bool, SessionError> {
        self.request(|reply| Command::ToggleMute { reply }).await
    }

    /// Volume on the 0-100 scale; out-of-range values are clamped.
    pub async fn set_volume(&self, percent: f32) -> Result<(), SessionError> {
        self.request(|reply| Command::SetVolume { percent, reply })
            .await
    }

    pub async fn clear_error(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::ClearError { reply }).await
    }

    pub fn snapshot(&self) -> CallSession {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallSession> {
        self.state.clone()
    }
}
