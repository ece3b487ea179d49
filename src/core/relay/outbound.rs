//! Backend-to-device audio path.
//!
//! Agent PCM arrives in arbitrarily sized chunks. It is accumulated until a
//! pre-buffer threshold is reached, then cut into fixed frames, encoded and
//! handed to the paced sender. Leftover bytes smaller than a frame stay
//! buffered until more audio arrives.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, warn};

use super::pacer::{PacedSender, PlaybackIndication};
use super::turn::TurnMachine;
use crate::core::audio::{
    CodecFactory, FRAME_BYTES, FRAME_DURATION_MS, FRAME_SAMPLES, FrameEncoder, PRE_BUFFER_BYTES,
};

/// Framing parameters of the outbound path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundPolicy {
    pub frame_bytes: usize,
    pub frame_samples: usize,
    pub frame_duration: Duration,
    /// Bytes buffered before playback of a fresh utterance starts
    pub pre_buffer_bytes: usize,
}

impl Default for OutboundPolicy {
    fn default() -> Self {
        Self {
            frame_bytes: FRAME_BYTES,
            frame_samples: FRAME_SAMPLES,
            frame_duration: Duration::from_millis(FRAME_DURATION_MS),
            pre_buffer_bytes: PRE_BUFFER_BYTES,
        }
    }
}

/// Result of feeding one backend chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboundOutcome {
    /// This chunk started playback of a fresh utterance
    pub playback_started: bool,
    /// Frames handed to the paced sender
    pub frames_sent: usize,
    /// A pending abort emptied the buffer
    pub aborted: bool,
}

pub struct OutboundRelay {
    codecs: Arc<dyn CodecFactory>,
    encoder: Option<Box<dyn FrameEncoder>>,
    buffer: Option<BytesMut>,
    policy: OutboundPolicy,
    frames_sent: u64,
}

impl OutboundRelay {
    pub fn new(codecs: Arc<dyn CodecFactory>, policy: OutboundPolicy) -> Self {
        Self {
            codecs,
            encoder: None,
            buffer: None,
            policy,
            frames_sent: 0,
        }
    }

    /// Accept one chunk of agent PCM.
    ///
    /// On the first threshold crossing of an utterance the turn machine enters
    /// the agent turn, the sender's clock is reset and a playback start is
    /// queued ahead of the first frame.
    pub fn handle_output_chunk(
        &mut self,
        pcm: &[u8],
        turn: &mut TurnMachine,
        sender: &PacedSender,
    ) -> OutboundOutcome {
        let mut outcome = OutboundOutcome::default();
        let policy = self.policy;

        let buffer = self
            .buffer
            .get_or_insert_with(|| BytesMut::with_capacity(policy.pre_buffer_bytes * 2));
        buffer.extend_from_slice(pcm);

        if !turn.playback_started() {
            if buffer.len() < policy.pre_buffer_bytes {
                return outcome;
            }
            turn.begin_agent_playback();
            sender.reset();
            sender.indicate(PlaybackIndication::Start);
            outcome.playback_started = true;
            debug!("Agent playback started with {} bytes buffered", buffer.len());
        }

        while buffer.len() >= policy.frame_bytes {
            if turn.is_aborting() {
                debug!("Abort pending, discarding {} buffered bytes", buffer.len());
                buffer.clear();
                outcome.aborted = true;
                break;
            }

            let frame = buffer.split_to(policy.frame_bytes);

            if self.encoder.is_none() {
                match self.codecs.encoder() {
                    Ok(encoder) => self.encoder = Some(encoder),
                    Err(e) => {
                        warn!("Failed to create audio encoder: {}", e);
                        continue;
                    }
                }
            }
            let Some(encoder) = self.encoder.as_mut() else {
                continue;
            };

            match encoder.encode(&frame, policy.frame_samples) {
                Ok(opus) => {
                    sender.send_frame(opus, policy.frame_duration);
                    outcome.frames_sent += 1;
                    self.frames_sent += 1;
                }
                Err(e) => warn!("Dropping agent frame: {}", e),
            }
        }

        outcome
    }

    /// Discard buffered agent audio.
    pub fn flush(&mut self) {
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clear();
        }
    }

    /// Drop the buffer and the encoder.
    pub fn release(&mut self) {
        self.buffer = None;
        self.encoder = None;
    }

    pub fn buffered(&self) -> usize {
        self.buffer.as_ref().map_or(0, |buffer| buffer.len())
    }

    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::{CodecResult, FrameDecoder};
    use crate::core::relay::pacer::DeviceOutput;
    use crate::core::relay::testing::PassthroughCodecs;
    use crate::core::relay::turn::{AbortSignal, TurnState};
    use bytes::Bytes;
    use tokio::sync::mpsc;

    fn relay(policy: OutboundPolicy) -> OutboundRelay {
        OutboundRelay::new(Arc::new(PassthroughCodecs::default()), policy)
    }

    fn sender_for(turn: &TurnMachine) -> (PacedSender, mpsc::Receiver<DeviceOutput>) {
        let (tx, rx) = mpsc::channel(64);
        (PacedSender::spawn(tx, turn.abort_signal()), rx)
    }

    #[tokio::test]
    async fn test_below_threshold_only_buffers() {
        let mut turn = TurnMachine::default();
        let (sender, _rx) = sender_for(&turn);
        let mut relay = relay(OutboundPolicy::default());

        let outcome = relay.handle_output_chunk(&[0u8; 3000], &mut turn, &sender);
        assert_eq!(outcome, OutboundOutcome::default());
        assert_eq!(relay.buffered(), 3000);
        assert!(!turn.playback_started());
        assert_eq!(turn.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_threshold_crossing_starts_playback() {
        let mut turn = TurnMachine::default();
        let (sender, mut rx) = sender_for(&turn);
        let mut relay = relay(OutboundPolicy::default());

        let outcome = relay.handle_output_chunk(&[7u8; 4000], &mut turn, &sender);
        assert!(outcome.playback_started);
        assert_eq!(outcome.frames_sent, 2);
        assert_eq!(relay.buffered(), 160);
        assert_eq!(turn.state(), TurnState::AgentTurn);

        assert_eq!(
            rx.recv().await.unwrap(),
            DeviceOutput::Playback(PlaybackIndication::Start)
        );
        match rx.recv().await.unwrap() {
            DeviceOutput::Audio(frame) => assert_eq!(frame.len(), FRAME_BYTES),
            other => panic!("Expected audio frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_default_policy_waits_for_two_frames() {
        let mut turn = TurnMachine::default();
        let (sender, _rx) = sender_for(&turn);
        let mut relay = relay(OutboundPolicy::default());

        for chunk in [1000usize, 1000, 200] {
            let outcome = relay.handle_output_chunk(&vec![0u8; chunk], &mut turn, &sender);
            assert_eq!(outcome.frames_sent, 0);
        }
        assert_eq!(relay.buffered(), 2200);
    }

    #[tokio::test]
    async fn test_single_frame_pre_buffer_leaves_remainder() {
        let mut turn = TurnMachine::default();
        let (sender, _rx) = sender_for(&turn);
        let mut relay = relay(OutboundPolicy {
            pre_buffer_bytes: FRAME_BYTES,
            ..Default::default()
        });

        assert_eq!(
            relay
                .handle_output_chunk(&[0u8; 1000], &mut turn, &sender)
                .frames_sent,
            0
        );
        let second = relay.handle_output_chunk(&[0u8; 1000], &mut turn, &sender);
        assert!(second.playback_started);
        assert_eq!(second.frames_sent, 1);
        assert_eq!(relay.buffered(), 80);

        let third = relay.handle_output_chunk(&[0u8; 200], &mut turn, &sender);
        assert_eq!(third.frames_sent, 0);
        assert_eq!(relay.buffered(), 280);
    }

    #[tokio::test]
    async fn test_pending_abort_clears_buffer() {
        let mut turn = TurnMachine::default();
        let (sender, _rx) = sender_for(&turn);
        let mut relay = relay(OutboundPolicy::default());

        relay.handle_output_chunk(&[0u8; 4000], &mut turn, &sender);
        turn.begin_mute();

        let outcome = relay.handle_output_chunk(&[0u8; 4000], &mut turn, &sender);
        assert!(outcome.aborted);
        assert_eq!(outcome.frames_sent, 0);
        assert_eq!(relay.buffered(), 0);
    }

    /// Encoder that raises the abort flag after the first frame it encodes.
    struct AbortingEncoder {
        abort: AbortSignal,
    }

    impl FrameEncoder for AbortingEncoder {
        fn encode(&mut self, pcm: &[u8], _sample_count: usize) -> CodecResult<Bytes> {
            self.abort.set();
            Ok(Bytes::copy_from_slice(pcm))
        }
    }

    struct AbortingCodecs {
        abort: AbortSignal,
    }

    impl CodecFactory for AbortingCodecs {
        fn decoder(&self) -> CodecResult<Box<dyn FrameDecoder>> {
            PassthroughCodecs::default().decoder()
        }

        fn encoder(&self) -> CodecResult<Box<dyn FrameEncoder>> {
            Ok(Box::new(AbortingEncoder {
                abort: self.abort.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_abort_mid_drain_discards_rest() {
        let mut turn = TurnMachine::default();
        let (sender, _rx) = sender_for(&turn);
        let codecs = AbortingCodecs {
            abort: turn.abort_signal(),
        };
        let mut relay = OutboundRelay::new(Arc::new(codecs), OutboundPolicy::default());

        let outcome = relay.handle_output_chunk(&vec![0u8; FRAME_BYTES * 5], &mut turn, &sender);
        assert_eq!(outcome.frames_sent, 1);
        assert!(outcome.aborted);
        assert_eq!(relay.buffered(), 0);
    }

    #[tokio::test]
    async fn test_encode_failure_drops_only_that_frame() {
        let mut turn = TurnMachine::default();
        let (sender, _rx) = sender_for(&turn);
        let mut relay = OutboundRelay::new(
            Arc::new(PassthroughCodecs::failing_encoder_at(1)),
            OutboundPolicy::default(),
        );

        let outcome = relay.handle_output_chunk(&vec![0u8; FRAME_BYTES * 3], &mut turn, &sender);
        assert_eq!(outcome.frames_sent, 2);
        assert_eq!(relay.buffered(), 0);
    }

    #[tokio::test]
    async fn test_second_utterance_needs_fresh_pre_buffer() {
        let mut turn = TurnMachine::default();
        let (sender, _rx) = sender_for(&turn);
        let mut relay = relay(OutboundPolicy::default());

        relay.handle_output_chunk(&[0u8; 4000], &mut turn, &sender);
        turn.on_agent_response();
        relay.flush();

        let outcome = relay.handle_output_chunk(&[0u8; 2000], &mut turn, &sender);
        assert_eq!(outcome.frames_sent, 0);
        assert!(!turn.playback_started());
    }

    #[tokio::test]
    async fn test_release() {
        let mut turn = TurnMachine::default();
        let (sender, _rx) = sender_for(&turn);
        let mut relay = relay(OutboundPolicy::default());

        relay.handle_output_chunk(&[0u8; 4000], &mut turn, &sender);
        assert!(relay.has_encoder());

        relay.release();
        assert!(!relay.has_encoder());
        assert_eq!(relay.buffered(), 0);
    }
}
