//! Per-session actor.
//!
//! Each device connection owns one actor task. Device commands and backend
//! events are both handled on that task, one at a time, so the turn machine
//! and the outbound buffer never see concurrent writers. Device commands are
//! polled first: a user starting to speak must not wait behind a backlog of
//! agent audio.
//!
//! ```text
//!  device ws ──commands──▶ ┌──────────────┐ ──PCM──▶ backend
//!                          │ SessionCore  │
//!  device ws ◀──paced───── └──────────────┘ ◀─events─ backend
//! ```

use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use super::inbound::InboundRelay;
use super::outbound::{OutboundPolicy, OutboundRelay};
use super::pacer::{DeviceOutput, PacedSender, PlaybackIndication};
use super::turn::{ActivityDecision, DEFAULT_INTERRUPTION_THRESHOLD, TurnMachine, TurnState};
use crate::core::audio::{CodecFactory, OpusCodecFactory};
use crate::core::backend::{BackendError, BackendEvent, BackendEvents, BackendResult, BoxedBackend};

/// Queued device commands per session.
const DEFAULT_COMMAND_BUFFER: usize = 64;

/// Errors returned by [`SessionHandle`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has been cleaned up
    #[error("Session closed")]
    Closed,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Device listen state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenState {
    Start,
    Stop,
    Detect,
}

/// Receives listen signals that the voice-to-voice path does not handle.
///
/// With voice-to-voice enabled only `stop` and `detect` arrive here; with it
/// disabled every listen signal does.
#[async_trait]
pub trait ListenCollaborator: Send + Sync {
    async fn on_listen_start(&self, session_id: &str, mode: Option<&str>) {
        debug!(session_id, mode, "Listen start not handled");
    }

    async fn on_listen_stop(&self, session_id: &str) {
        debug!(session_id, "Listen stop not handled");
    }

    async fn on_wake_word(&self, session_id: &str, text: Option<&str>) {
        debug!(session_id, text, "Wake word detection not handled");
    }
}

/// Collaborator that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCollaborator;

impl ListenCollaborator for LoggingCollaborator {}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Route device audio to the backend; otherwise listen signals go to
    /// the collaborator and audio is ignored
    pub v2v_enabled: bool,
    pub interruption_threshold: u32,
    pub outbound: OutboundPolicy,
    pub command_buffer: usize,
    /// Device identifier, for logs
    pub device_id: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            v2v_enabled: true,
            interruption_threshold: DEFAULT_INTERRUPTION_THRESHOLD,
            outbound: OutboundPolicy::default(),
            command_buffer: DEFAULT_COMMAND_BUFFER,
            device_id: None,
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub turn: TurnState,
    pub speaking: bool,
    pub aborting: bool,
    pub playback_started: bool,
    pub inbound_count: u32,
    pub activity_notified: bool,
    pub buffered_bytes: usize,
    pub backend_active: bool,
    pub backend_state: String,
    pub remote_session_id: Option<String>,
    pub frames_forwarded: u64,
    pub frames_sent: u64,
    pub listen_mode: Option<String>,
}

enum Command {
    Listen {
        state: ListenState,
        mode: Option<String>,
        text: Option<String>,
    },
    Audio(Bytes),
    Abort,
    StartConversation(oneshot::Sender<BackendResult<()>>),
    StopConversation(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Cleanup(oneshot::Sender<()>),
}

/// Cloneable handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    commands: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub async fn listen(
        &self,
        state: ListenState,
        mode: Option<String>,
        text: Option<String>,
    ) -> Result<(), SessionError> {
        self.send(Command::Listen { state, mode, text }).await
    }

    /// Forward one Opus frame from the device.
    pub async fn audio(&self, opus: Bytes) -> Result<(), SessionError> {
        self.send(Command::Audio(opus)).await
    }

    /// Stop agent playback without notifying the backend.
    pub async fn abort(&self) -> Result<(), SessionError> {
        self.send(Command::Abort).await
    }

    /// Open (or re-open) the backend conversation.
    pub async fn start_conversation(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::StartConversation(tx)).await?;
        rx.await.map_err(|_| SessionError::Closed)??;
        Ok(())
    }

    pub async fn stop_conversation(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::StopConversation(tx)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Tear the session down and wait for it. Safe to call any number of times.
    pub async fn cleanup(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Cleanup(tx)).await.is_err() {
            return;
        }
        // A dropped reply means another cleanup got there first
        let _ = rx.await;
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

/// A session that has not been started yet.
pub struct Session {
    id: String,
    backend: BoxedBackend,
    device: mpsc::Sender<DeviceOutput>,
    settings: SessionSettings,
    codecs: Arc<dyn CodecFactory>,
    collaborator: Arc<dyn ListenCollaborator>,
    turn: TurnMachine,
}

impl Session {
    pub fn new(
        backend: BoxedBackend,
        device: mpsc::Sender<DeviceOutput>,
        settings: SessionSettings,
    ) -> Self {
        let turn = TurnMachine::new(settings.interruption_threshold);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            backend,
            device,
            settings,
            codecs: Arc::new(OpusCodecFactory),
            collaborator: Arc::new(LoggingCollaborator),
            turn,
        }
    }

    pub fn with_codecs(mut self, codecs: Arc<dyn CodecFactory>) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_collaborator(mut self, collaborator: Arc<dyn ListenCollaborator>) -> Self {
        self.collaborator = collaborator;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    #[cfg(test)]
    pub(crate) fn abort_signal(&self) -> super::turn::AbortSignal {
        self.turn.abort_signal()
    }

    /// Start the actor task. Must be called inside a Tokio runtime.
    pub fn spawn(self) -> SessionHandle {
        let (tx, rx) = mpsc::channel(self.settings.command_buffer.max(1));
        let span = info_span!(
            "v2v_session",
            session_id = %self.id,
            device_id = self.settings.device_id.as_deref().unwrap_or("-"),
        );

        let sender = PacedSender::spawn(self.device, self.turn.abort_signal());
        let core = SessionCore {
            id: self.id.clone(),
            backend: self.backend,
            events: None,
            inbound: InboundRelay::new(Arc::clone(&self.codecs)),
            outbound: OutboundRelay::new(self.codecs, self.settings.outbound),
            turn: self.turn,
            sender,
            collaborator: self.collaborator,
            settings: self.settings,
            listen_mode: None,
            inactive_warned: false,
            closed: false,
        };

        tokio::spawn(run(core, rx).instrument(span));

        SessionHandle {
            id: self.id,
            commands: tx,
        }
    }
}

async fn run(mut core: SessionCore, mut commands: mpsc::Receiver<Command>) {
    info!("Session started");

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("All session handles dropped");
                    core.cleanup().await;
                    break;
                };
                if let ControlFlow::Break(reply) = core.handle_command(command).await {
                    commands.close();
                    let _ = reply.send(());
                    break;
                }
            }

            event = next_event(&mut core.events) => match event {
                Some(event) => core.handle_backend_event(event).await,
                None => {
                    debug!("Backend event stream ended");
                    core.events = None;
                }
            },
        }
    }

    info!("Session ended");
}

async fn next_event(events: &mut Option<BackendEvents>) -> Option<BackendEvent> {
    match events {
        Some(events) => events.next().await,
        None => std::future::pending().await,
    }
}

struct SessionCore {
    id: String,
    settings: SessionSettings,
    backend: BoxedBackend,
    events: Option<BackendEvents>,
    turn: TurnMachine,
    inbound: InboundRelay,
    outbound: OutboundRelay,
    sender: PacedSender,
    collaborator: Arc<dyn ListenCollaborator>,
    listen_mode: Option<String>,
    inactive_warned: bool,
    closed: bool,
}

impl SessionCore {
    /// Returns the cleanup reply once the session should stop.
    async fn handle_command(&mut self, command: Command) -> ControlFlow<oneshot::Sender<()>> {
        match command {
            Command::Listen { state, mode, text } => self.handle_listen(state, mode, text).await,
            Command::Audio(opus) => self.handle_input_frame(&opus).await,
            Command::Abort => self.handle_abort(),
            Command::StartConversation(reply) => {
                let result = self.start_conversation().await;
                let _ = reply.send(result);
            }
            Command::StopConversation(reply) => {
                self.stop_conversation().await;
                let _ = reply.send(());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Cleanup(reply) => {
                self.cleanup().await;
                return ControlFlow::Break(reply);
            }
        }
        ControlFlow::Continue(())
    }

    // -------------------------------------------------------------------------
    // Conversation lifecycle
    // -------------------------------------------------------------------------

    async fn start_conversation(&mut self) -> BackendResult<()> {
        if self.backend.is_active() || self.events.is_some() {
            self.stop_conversation().await;
        }
        self.open_backend().await
    }

    async fn open_backend(&mut self) -> BackendResult<()> {
        match self.backend.open().await {
            Ok(events) => {
                self.events = Some(events);
                self.inactive_warned = false;
                info!(
                    provider = %self.backend.get_provider_info()["provider"],
                    "Conversation started"
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to start conversation: {}", e);
                self.events = None;
                Err(e)
            }
        }
    }

    async fn stop_conversation(&mut self) {
        self.events = None;
        if let Err(e) = self.backend.close().await {
            warn!("Error closing backend: {}", e);
        }
        self.outbound.flush();
        self.sender.reset();
        self.turn.reset();
        debug!("Conversation stopped");
    }

    async fn cleanup(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.stop_conversation().await;
        self.sender.shutdown().await;
        self.inbound.release();
        self.outbound.release();
        info!(
            frames_forwarded = self.inbound.frames_forwarded(),
            frames_sent = self.outbound.frames_sent(),
            "Session cleaned up"
        );
    }

    // -------------------------------------------------------------------------
    // Device signals
    // -------------------------------------------------------------------------

    async fn handle_listen(
        &mut self,
        state: ListenState,
        mode: Option<String>,
        text: Option<String>,
    ) {
        if let Some(mode) = mode {
            debug!(mode = %mode, "Listen mode set");
            self.listen_mode = Some(mode);
        }

        match state {
            ListenState::Start if self.settings.v2v_enabled => self.start_speaking().await,
            ListenState::Start => {
                self.collaborator
                    .on_listen_start(&self.id, self.listen_mode.as_deref())
                    .await
            }
            ListenState::Stop => self.collaborator.on_listen_stop(&self.id).await,
            ListenState::Detect => {
                self.collaborator
                    .on_wake_word(&self.id, text.as_deref())
                    .await
            }
        }
    }

    /// Mute locally, then tell the backend the user is speaking.
    async fn start_speaking(&mut self) {
        let interrupted = self.mute_playback();

        if !self.backend.is_active() {
            info!("Backend inactive on listen start, reopening conversation");
            if self.open_backend().await.is_err() {
                self.turn.finish_mute();
                return;
            }
        }

        self.notify_user_activity().await;
        self.turn.finish_mute();
        debug!(interrupted, "User turn started");
    }

    fn handle_abort(&mut self) {
        let interrupted = self.turn.stop_playback();
        self.outbound.flush();
        self.sender.reset();
        self.sender.indicate(PlaybackIndication::Stop);
        info!(interrupted, "Playback aborted by device");
    }

    async fn handle_input_frame(&mut self, opus: &[u8]) {
        if !self.settings.v2v_enabled {
            trace!("Voice-to-voice disabled, ignoring device audio");
            return;
        }
        if !self.backend.is_active() {
            if !self.inactive_warned {
                warn!("Backend not connected, dropping device audio");
                self.inactive_warned = true;
            }
            return;
        }

        match self.turn.record_inbound_chunk() {
            ActivityDecision::None => {}
            ActivityDecision::Notify => self.notify_user_activity().await,
            ActivityDecision::Interrupt => {
                info!("User is talking over the agent, interrupting playback");
                self.mute_playback();
                self.notify_user_activity().await;
                self.turn.finish_mute();
            }
        }

        self.inbound.forward(opus, &mut *self.backend).await;
    }

    /// Abort, flush buffered and queued agent audio, and take the floor.
    fn mute_playback(&mut self) -> bool {
        let interrupted = self.turn.begin_mute();
        self.outbound.flush();
        self.sender.reset();
        interrupted
    }

    async fn notify_user_activity(&mut self) {
        if let Err(e) = self.backend.notify_user_activity().await {
            warn!("Failed to notify backend of user activity: {}", e);
        }
    }

    // -------------------------------------------------------------------------
    // Backend signals
    // -------------------------------------------------------------------------

    async fn handle_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::SessionReady { session_id } => {
                info!(remote_session_id = %session_id, "Backend conversation ready");
            }
            BackendEvent::UserTranscript { text } => {
                info!(transcript = %text, "User transcript");
                self.turn.on_user_transcript();
            }
            BackendEvent::AgentResponse { text } => {
                info!(response = %text, "Agent response");
                self.turn.on_agent_response();
                self.sender.indicate(PlaybackIndication::Stop);
            }
            BackendEvent::Interruption => {
                info!("Backend acknowledged interruption");
                self.turn.on_interruption_ack();
                self.outbound.flush();
                self.sender.reset();
            }
            BackendEvent::AudioChunk(pcm) => self.handle_output_chunk(&pcm),
            BackendEvent::Keepalive { event_id } => {
                trace!(event_id = %event_id, "Backend keepalive");
            }
            BackendEvent::Disconnected => {
                warn!("Backend connection lost");
                self.events = None;
            }
        }
    }

    fn handle_output_chunk(&mut self, pcm: &[u8]) {
        self.outbound
            .handle_output_chunk(pcm, &mut self.turn, &self.sender);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            turn: self.turn.state(),
            speaking: self.turn.is_speaking(),
            aborting: self.turn.is_aborting(),
            playback_started: self.turn.playback_started(),
            inbound_count: self.turn.inbound_count(),
            activity_notified: self.turn.activity_notified(),
            buffered_bytes: self.outbound.buffered(),
            backend_active: self.backend.is_active(),
            backend_state: self.backend.get_connection_state().to_string(),
            remote_session_id: self.backend.session_id(),
            frames_forwarded: self.inbound.frames_forwarded(),
            frames_sent: self.outbound.frames_sent(),
            listen_mode: self.listen_mode.clone(),
        }
    }
}
