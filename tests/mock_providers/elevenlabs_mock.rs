//! ElevenLabs Conversational AI mock server
//!
//! Accepts conversation WebSockets on a random local port, answers with
//! initiation metadata, and records every JSON message the gateway sends.
//! Tests push server events into the live connection through [`ElevenLabsMock`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Instruction for the currently connected client.
#[derive(Debug)]
enum MockCommand {
    Send(Message),
    Close,
}

#[derive(Default)]
struct MockState {
    received: Mutex<Vec<Value>>,
    connection: Mutex<Option<mpsc::UnboundedSender<MockCommand>>>,
    connections: AtomicU64,
    disconnections: AtomicU64,
}

/// Handle to a running mock server.
pub struct ElevenLabsMock {
    port: u16,
    state: Arc<MockState>,
    accept_task: JoinHandle<()>,
}

impl ElevenLabsMock {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(MockState::default());

        let accept_state = state.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_state = accept_state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, conn_state).await {
                        eprintln!("Mock ElevenLabs connection error: {}", e);
                    }
                });
            }
        });

        Self {
            port,
            state,
            accept_task,
        }
    }

    /// Base URL to configure as the backend's `base_url`.
    pub fn base_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Every JSON message received so far, across connections.
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().clone()
    }

    /// Received messages whose `type` is `kind`.
    pub fn received_of_type(&self, kind: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|msg| msg.get("type").and_then(Value::as_str) == Some(kind))
            .collect()
    }

    /// Decoded PCM from every `user_audio_chunk` received.
    pub fn received_audio(&self) -> Vec<Vec<u8>> {
        self.received()
            .iter()
            .filter_map(|msg| msg.get("user_audio_chunk").and_then(Value::as_str))
            .filter_map(|b64| BASE64_STANDARD.decode(b64).ok())
            .collect()
    }

    pub fn connection_count(&self) -> u64 {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn disconnection_count(&self) -> u64 {
        self.state.disconnections.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.state.connection.lock().is_some()
    }

    fn push(&self, message: Message) {
        if let Some(tx) = self.state.connection.lock().as_ref() {
            let _ = tx.send(MockCommand::Send(message));
        }
    }

    /// Push a raw server event to the live connection.
    pub fn send(&self, event: Value) {
        self.push(Message::Text(event.to_string().into()));
    }

    /// Push a text frame verbatim, valid JSON or not.
    pub fn send_text(&self, text: &str) {
        self.push(Message::Text(text.to_string().into()));
    }

    /// Push a binary frame.
    pub fn send_binary(&self, data: Vec<u8>) {
        self.push(Message::Binary(data.into()));
    }

    pub fn send_ping(&self, event_id: Value) {
        self.send(json!({"type": "ping", "ping_event": {"event_id": event_id, "ping_ms": 0}}));
    }

    pub fn send_audio(&self, pcm: &[u8]) {
        self.send(json!({
            "type": "audio",
            "audio_event": {"audio_base_64": BASE64_STANDARD.encode(pcm), "event_id": 1}
        }));
    }

    pub fn send_agent_response(&self, text: &str) {
        self.send(json!({"type": "agent_response", "agent_response_event": {"agent_response": text}}));
    }

    pub fn send_user_transcript(&self, text: &str) {
        self.send(json!({"type": "user_transcript", "user_transcription_event": {"user_transcript": text}}));
    }

    pub fn send_interruption(&self) {
        self.send(json!({"type": "interruption", "interruption_event": {"event_id": 2}}));
    }

    /// Drop the live connection from the server side.
    pub fn close_connection(&self) {
        if let Some(tx) = self.state.connection.lock().take() {
            let _ = tx.send(MockCommand::Close);
        }
    }
}

impl Drop for ElevenLabsMock {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let conn_id = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let (tx, mut rx) = mpsc::unbounded_channel();
    *state.connection.lock() = Some(tx);

    let metadata = json!({
        "type": "conversation_initiation_metadata",
        "conversation_initiation_metadata_event": {
            "conversation_id": format!("conv-{}", conn_id),
            "agent_output_audio_format": "pcm_16000",
            "user_input_audio_format": "pcm_16000"
        }
    });
    write.send(Message::Text(metadata.to_string().into())).await?;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(MockCommand::Send(message)) => {
                    write.send(message).await?;
                }
                Some(MockCommand::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&text) {
                        state.received.lock().push(value);
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    write.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    eprintln!("Mock ElevenLabs read error: {}", e);
                    break;
                }
            },
        }
    }

    drop(rx);
    state.disconnections.fetch_add(1, Ordering::SeqCst);
    let mut current = state.connection.lock();
    if current.as_ref().is_some_and(|tx| tx.is_closed()) {
        *current = None;
    }
    Ok(())
}
