//! Real-time audio relay and turn-taking.
//!
//! One [`Session`] per device connection ties together:
//!
//! - [`InboundRelay`]: device Opus frames decoded and forwarded as PCM
//! - [`OutboundRelay`]: agent PCM pre-buffered, framed and encoded
//! - [`PacedSender`]: frames released to the device at playback speed
//! - [`TurnMachine`]: who holds the floor, and local interruption detection

mod inbound;
mod outbound;
mod pacer;
mod session;
#[cfg(test)]
pub(crate) mod testing;
mod turn;

pub use inbound::InboundRelay;
pub use outbound::{OutboundOutcome, OutboundPolicy, OutboundRelay};
pub use pacer::{DeviceOutput, PRE_BUFFER_FRAMES, PacedSender, PlaybackIndication};
pub use session::{
    ListenCollaborator, ListenState, LoggingCollaborator, Session, SessionError, SessionHandle,
    SessionSettings, SessionSnapshot,
};
pub use turn::{
    AbortSignal, ActivityDecision, DEFAULT_INTERRUPTION_THRESHOLD, TurnMachine, TurnState,
};
