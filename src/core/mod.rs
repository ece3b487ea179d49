pub mod audio;
pub mod backend;
pub mod relay;

// Re-export commonly used types for convenience
pub use backend::{
    BackendConfig, BackendError, BackendEvent, BackendEvents, BackendResult, BaseBackend,
    BoxedBackend, ConnectionState, create_backend, get_supported_backends,
};

pub use relay::{
    DeviceOutput, ListenCollaborator, ListenState, PlaybackIndication, Session, SessionError,
    SessionHandle, SessionSettings, SessionSnapshot, TurnState,
};
