//! Turn state machine.
//!
//! Tracks whose turn it is to speak and owns the per-session turn flags. All
//! methods are synchronous; the session actor is the only caller, so a turn
//! machine is never touched from two paths at once. The abort flag is the one
//! piece shared outward (with the paced sender) and is atomic for that reason.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

/// Inbound chunks forwarded without a notification before the local
/// interruption heuristic fires.
pub const DEFAULT_INTERRUPTION_THRESHOLD: u32 = 5;

/// Who currently has the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// No one is speaking
    #[default]
    Idle,
    /// Device audio is being forwarded; earlier agent output was cut
    UserTurn,
    /// Agent output is playing
    AgentTurn,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "idle"),
            TurnState::UserTurn => write!(f, "user_turn"),
            TurnState::AgentTurn => write!(f, "agent_turn"),
        }
    }
}

/// Drop-everything flag checked by the outbound drain loop and the paced sender.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the session should do after an inbound chunk was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityDecision {
    /// Nothing to do
    None,
    /// Tell the backend the user is speaking
    Notify,
    /// The user is talking over the agent: mute locally, then notify
    Interrupt,
}

/// Per-session turn state and flags.
#[derive(Debug)]
pub struct TurnMachine {
    state: TurnState,
    abort: AbortSignal,
    playback_started: bool,
    inbound_count: u32,
    activity_notified: bool,
    threshold: u32,
}

impl TurnMachine {
    pub fn new(threshold: u32) -> Self {
        Self {
            state: TurnState::Idle,
            abort: AbortSignal::new(),
            playback_started: false,
            inbound_count: 0,
            activity_notified: false,
            threshold: threshold.max(1),
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Agent audio is audible on the device.
    pub fn is_speaking(&self) -> bool {
        self.state == TurnState::AgentTurn
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn is_aborting(&self) -> bool {
        self.abort.is_set()
    }

    pub fn playback_started(&self) -> bool {
        self.playback_started
    }

    pub fn inbound_count(&self) -> u32 {
        self.inbound_count
    }

    pub fn activity_notified(&self) -> bool {
        self.activity_notified
    }

    // -------------------------------------------------------------------------
    // Local signals
    // -------------------------------------------------------------------------

    /// Count one inbound chunk and apply the local interruption heuristic.
    ///
    /// Fires at most once per agent turn: the threshold re-arms only when
    /// agent playback starts again.
    pub fn record_inbound_chunk(&mut self) -> ActivityDecision {
        self.inbound_count = self.inbound_count.saturating_add(1);

        if self.activity_notified || self.inbound_count < self.threshold {
            return ActivityDecision::None;
        }

        self.activity_notified = true;
        if self.is_speaking() {
            ActivityDecision::Interrupt
        } else {
            ActivityDecision::Notify
        }
    }

    /// First half of the mute-then-notify sequence.
    ///
    /// Sets the abort flag and takes the floor for the user. Returns `true`
    /// when agent output was actually cut off. The caller must flush its
    /// output buffers before notifying the backend, then call
    /// [`finish_mute`](Self::finish_mute).
    pub fn begin_mute(&mut self) -> bool {
        let interrupted = self.is_speaking() || self.playback_started;

        self.abort.set();
        self.playback_started = false;
        self.state = TurnState::UserTurn;
        interrupted
    }

    /// Second half of the mute-then-notify sequence.
    ///
    /// Clears the abort flag so the next inbound frame is not dropped. The
    /// notification just sent counts as this user turn's notification.
    pub fn finish_mute(&mut self) {
        self.abort.clear();
        self.inbound_count = 0;
        self.activity_notified = true;
    }

    /// Device asked to stop playback without taking the floor.
    pub fn stop_playback(&mut self) -> bool {
        let interrupted = self.begin_mute();
        self.abort.clear();
        self.state = TurnState::Idle;
        interrupted
    }

    /// Playback threshold crossed for a fresh utterance.
    ///
    /// Re-arms the interruption heuristic and clears stale abort state.
    pub fn begin_agent_playback(&mut self) {
        self.playback_started = true;
        self.inbound_count = 0;
        self.activity_notified = false;
        self.abort.clear();
        self.state = TurnState::AgentTurn;
    }

    // -------------------------------------------------------------------------
    // Remote signals
    // -------------------------------------------------------------------------

    /// The user's utterance is complete; the agent's reply comes next.
    pub fn on_user_transcript(&mut self) {
        self.abort.clear();
        self.playback_started = false;
        self.state = TurnState::Idle;
    }

    /// Turn-end marker. Always resets playback, whatever the prior state.
    pub fn on_agent_response(&mut self) {
        self.abort.clear();
        self.playback_started = false;
        self.state = TurnState::Idle;
    }

    /// Remote acknowledgment of an interruption. The caller flushes output.
    ///
    /// After a local mute this changes nothing: playback was already cut and
    /// the next agent audio goes through the pre-buffer again.
    pub fn on_interruption_ack(&mut self) {
        self.playback_started = false;
        if self.state == TurnState::AgentTurn {
            self.state = TurnState::Idle;
        }
    }

    /// Forget everything; used when a conversation is torn down.
    pub fn reset(&mut self) {
        self.abort.clear();
        self.playback_started = false;
        self.inbound_count = 0;
        self.activity_notified = false;
        self.state = TurnState::Idle;
    }
}

impl Default for TurnMachine {
    fn default() -> Self {
        Self::new(DEFAULT_INTERRUPTION_THRESHOLD)
    }
}
