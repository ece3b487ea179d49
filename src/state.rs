//! Application state shared across connections.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::backend::{BackendResult, BoxedBackend, create_backend};
use crate::core::relay::{ListenCollaborator, LoggingCollaborator, SessionHandle, SessionSettings};

pub struct AppState {
    pub config: ServerConfig,
    collaborator: Arc<dyn ListenCollaborator>,
    sessions: DashMap<String, SessionHandle>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Self::with_collaborator(config, Arc::new(LoggingCollaborator))
    }

    /// State whose sessions hand unhandled listen signals to `collaborator`.
    pub fn with_collaborator(
        config: ServerConfig,
        collaborator: Arc<dyn ListenCollaborator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            collaborator,
            sessions: DashMap::new(),
        })
    }

    /// Create a backend for a new session from the configured provider.
    pub fn create_backend(&self) -> BackendResult<BoxedBackend> {
        let v2v = &self.config.v2v;
        create_backend(&v2v.provider, v2v.backend_config())
    }

    pub fn session_settings(&self, device_id: Option<String>) -> SessionSettings {
        SessionSettings {
            device_id,
            ..self.config.v2v.session_settings()
        }
    }

    pub fn collaborator(&self) -> Arc<dyn ListenCollaborator> {
        Arc::clone(&self.collaborator)
    }

    pub fn register_session(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id().to_string(), handle);
    }

    pub fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Clean up every live session. Used on shutdown.
    pub async fn shutdown_sessions(&self) {
        let handles: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "Cleaning up active sessions");
        futures::future::join_all(handles.iter().map(|handle| handle.cleanup())).await;
        self.sessions.clear();
    }
}
