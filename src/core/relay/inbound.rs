//! Device-to-backend audio path.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::core::audio::{CodecFactory, FrameDecoder};
use crate::core::backend::BaseBackend;

/// Decodes device Opus frames and forwards the PCM to the backend.
///
/// The decoder is created on the first frame and released on teardown.
pub struct InboundRelay {
    codecs: Arc<dyn CodecFactory>,
    decoder: Option<Box<dyn FrameDecoder>>,
    frames_forwarded: u64,
    frames_dropped: u64,
}

impl InboundRelay {
    pub fn new(codecs: Arc<dyn CodecFactory>) -> Self {
        Self {
            codecs,
            decoder: None,
            frames_forwarded: 0,
            frames_dropped: 0,
        }
    }

    /// Decode one frame and hand it to the backend.
    ///
    /// Returns `true` if the frame reached the backend. Decode and send
    /// failures drop the frame and leave the session running.
    pub async fn forward(&mut self, opus: &[u8], backend: &mut dyn BaseBackend) -> bool {
        let Some(pcm) = self.decode(opus) else {
            self.frames_dropped += 1;
            return false;
        };

        match backend.send_audio(pcm).await {
            Ok(()) => {
                self.frames_forwarded += 1;
                true
            }
            Err(e) => {
                warn!("Failed to forward audio to backend: {}", e);
                self.frames_dropped += 1;
                false
            }
        }
    }

    fn decode(&mut self, opus: &[u8]) -> Option<Bytes> {
        if self.decoder.is_none() {
            match self.codecs.decoder() {
                Ok(decoder) => self.decoder = Some(decoder),
                Err(e) => {
                    warn!("Failed to create audio decoder: {}", e);
                    return None;
                }
            }
        }
        let decoder = self.decoder.as_mut()?;

        match decoder.decode(opus) {
            Ok(pcm) if pcm.is_empty() => None,
            Ok(pcm) => Some(pcm),
            Err(e) => {
                debug!("Skipping undecodable device frame ({} bytes): {}", opus.len(), e);
                None
            }
        }
    }

    /// Release the decoder. The relay can still be reused afterwards.
    pub fn release(&mut self) {
        self.decoder = None;
    }

    pub fn has_decoder(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn frames_forwarded(&self) -> u64 {
        self.frames_forwarded
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}
