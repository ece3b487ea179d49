//! Test doubles for the relay: passthrough codecs and a scripted backend.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::turn::AbortSignal;
use crate::core::audio::{CodecError, CodecFactory, CodecResult, FrameDecoder, FrameEncoder};
use crate::core::backend::{
    BackendConfig, BackendError, BackendEvent, BackendEvents, BackendResult, BaseBackend,
    ConnectionState,
};

/// Codecs that copy bytes through unchanged.
#[derive(Debug, Default, Clone)]
pub struct PassthroughCodecs {
    fail_encode_at: Option<usize>,
}

impl PassthroughCodecs {
    /// Encoder that fails on the frame with this zero-based index.
    pub fn failing_encoder_at(index: usize) -> Self {
        Self {
            fail_encode_at: Some(index),
        }
    }
}

impl CodecFactory for PassthroughCodecs {
    fn decoder(&self) -> CodecResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(PassthroughDecoder))
    }

    fn encoder(&self) -> CodecResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(PassthroughEncoder {
            fail_at: self.fail_encode_at,
            encoded: 0,
        }))
    }
}

struct PassthroughDecoder;

impl FrameDecoder for PassthroughDecoder {
    fn decode(&mut self, opus: &[u8]) -> CodecResult<Bytes> {
        if opus.is_empty() {
            return Err(CodecError::Decode("empty packet".to_string()));
        }
        Ok(Bytes::copy_from_slice(opus))
    }
}

struct PassthroughEncoder {
    fail_at: Option<usize>,
    encoded: usize,
}

impl FrameEncoder for PassthroughEncoder {
    fn encode(&mut self, pcm: &[u8], sample_count: usize) -> CodecResult<Bytes> {
        let index = self.encoded;
        self.encoded += 1;

        if pcm.len() != sample_count * 2 {
            return Err(CodecError::Encode("short frame".to_string()));
        }
        if self.fail_at == Some(index) {
            return Err(CodecError::Encode("scripted failure".to_string()));
        }
        Ok(Bytes::copy_from_slice(pcm))
    }
}

#[derive(Default)]
struct MonitorState {
    active: bool,
    fail_open: bool,
    opens: usize,
    closes: usize,
    notifications: usize,
    sent_audio: Vec<Bytes>,
    events: Option<mpsc::UnboundedSender<BackendEvent>>,
    watched_abort: Option<AbortSignal>,
    abort_at_notify: Vec<bool>,
}

/// Shared view into a [`MockBackend`] that survives boxing it.
#[derive(Clone, Default)]
pub struct BackendMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl BackendMonitor {
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }

    pub fn notifications(&self) -> usize {
        self.state.lock().notifications
    }

    pub fn sent_audio(&self) -> Vec<Bytes> {
        self.state.lock().sent_audio.clone()
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub fn fail_next_opens(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Deliver an event as if the remote agent had sent it.
    pub fn emit(&self, event: BackendEvent) -> bool {
        match &self.state.lock().events {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Simulate the transport dropping.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock();
        state.active = false;
        if let Some(tx) = state.events.take() {
            let _ = tx.send(BackendEvent::Disconnected);
        }
    }

    /// Record the value of `abort` each time user activity is notified.
    pub fn watch_abort(&self, abort: AbortSignal) {
        self.state.lock().watched_abort = Some(abort);
    }

    pub fn abort_at_notify(&self) -> Vec<bool> {
        self.state.lock().abort_at_notify.clone()
    }
}

/// Scripted in-process backend.
pub struct MockBackend {
    monitor: BackendMonitor,
}

impl MockBackend {
    pub fn disconnected() -> Self {
        Self {
            monitor: BackendMonitor::default(),
        }
    }

    /// Active without an event stream, for driving relays directly.
    pub fn connected() -> Self {
        let backend = Self::disconnected();
        backend.monitor.state.lock().active = true;
        backend
    }

    pub fn monitor(&self) -> BackendMonitor {
        self.monitor.clone()
    }
}

#[async_trait]
impl BaseBackend for MockBackend {
    fn new(_config: BackendConfig) -> BackendResult<Self> {
        Ok(Self::disconnected())
    }

    async fn open(&mut self) -> BackendResult<BackendEvents> {
        let mut state = self.monitor.state.lock();
        if state.fail_open {
            return Err(BackendError::ConnectionFailed("scripted failure".to_string()));
        }
        let (tx, events) = BackendEvents::channel();
        state.events = Some(tx);
        state.active = true;
        state.opens += 1;
        Ok(events)
    }

    async fn send_audio(&mut self, pcm: Bytes) -> BackendResult<()> {
        let mut state = self.monitor.state.lock();
        if !state.active {
            return Err(BackendError::NotConnected);
        }
        state.sent_audio.push(pcm);
        Ok(())
    }

    async fn notify_user_activity(&mut self) -> BackendResult<()> {
        let mut state = self.monitor.state.lock();
        if !state.active {
            return Err(BackendError::NotConnected);
        }
        state.notifications += 1;
        let abort = state.watched_abort.as_ref().map(|a| a.is_set());
        if let Some(abort) = abort {
            state.abort_at_notify.push(abort);
        }
        Ok(())
    }

    async fn close(&mut self) -> BackendResult<()> {
        let mut state = self.monitor.state.lock();
        if state.active {
            state.closes += 1;
        }
        state.active = false;
        state.events = None;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.monitor.is_active()
    }

    fn get_connection_state(&self) -> ConnectionState {
        if self.is_active() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn session_id(&self) -> Option<String> {
        None
    }

    fn get_provider_info(&self) -> serde_json::Value {
        serde_json::json!({ "provider": "mock" })
    }
}
