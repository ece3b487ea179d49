//! Opus codec wrappers with fixed device framing.
//!
//! The relays only see the [`FrameDecoder`] and [`FrameEncoder`] traits so the
//! session can be driven with passthrough codecs in tests.

use audiopus::coder::{Decoder, Encoder};
use audiopus::packet::Packet;
use audiopus::{Application, Channels, MutSignals, SampleRate};
use bytes::Bytes;
use thiserror::Error;

use super::{FRAME_SAMPLES, SAMPLE_RATE};

/// Upper bound for one encoded Opus frame.
const MAX_OPUS_FRAME_BYTES: usize = 4000;

/// Errors raised by the transcoder. None of them are fatal to a session.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encoder or decoder could not be created
    #[error("Codec initialization failed: {0}")]
    Init(String),

    /// An Opus packet could not be decoded
    #[error("Opus decode failed: {0}")]
    Decode(String),

    /// A PCM frame could not be encoded
    #[error("Opus encode failed: {0}")]
    Encode(String),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Device-to-backend direction: Opus packet in, PCM bytes out.
pub trait FrameDecoder: Send {
    /// Decode one device packet into little-endian 16-bit PCM.
    fn decode(&mut self, opus: &[u8]) -> CodecResult<Bytes>;
}

/// Backend-to-device direction: PCM bytes in, Opus packet out.
pub trait FrameEncoder: Send {
    /// Encode `sample_count` samples of little-endian 16-bit PCM.
    fn encode(&mut self, pcm: &[u8], sample_count: usize) -> CodecResult<Bytes>;
}

/// Opus decoder bound to 16 kHz mono, 960-sample frames.
pub struct OpusFrameDecoder {
    decoder: Decoder,
    scratch: Vec<i16>,
}

impl OpusFrameDecoder {
    pub fn new() -> CodecResult<Self> {
        let decoder = Decoder::new(sample_rate()?, Channels::Mono)
            .map_err(|e| CodecError::Init(format!("Failed to create Opus decoder: {e}")))?;
        Ok(Self {
            decoder,
            scratch: vec![0i16; FRAME_SAMPLES],
        })
    }
}

impl FrameDecoder for OpusFrameDecoder {
    fn decode(&mut self, opus: &[u8]) -> CodecResult<Bytes> {
        let packet = Packet::try_from(opus)
            .map_err(|e| CodecError::Decode(format!("Invalid Opus packet: {e}")))?;
        let signals = MutSignals::try_from(self.scratch.as_mut_slice())
            .map_err(|e| CodecError::Decode(format!("Failed to create output buffer: {e}")))?;

        let decoded = self
            .decoder
            .decode(Some(packet), signals, false)
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        Ok(samples_to_bytes(&self.scratch[..decoded]))
    }
}

/// Opus encoder bound to 16 kHz mono in VoIP mode.
pub struct OpusFrameEncoder {
    encoder: Encoder,
    output: Vec<u8>,
}

impl OpusFrameEncoder {
    pub fn new() -> CodecResult<Self> {
        let encoder = Encoder::new(sample_rate()?, Channels::Mono, Application::Voip)
            .map_err(|e| CodecError::Init(format!("Failed to create Opus encoder: {e}")))?;
        Ok(Self {
            encoder,
            output: vec![0u8; MAX_OPUS_FRAME_BYTES],
        })
    }
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode(&mut self, pcm: &[u8], sample_count: usize) -> CodecResult<Bytes> {
        let samples = bytes_to_samples(pcm);
        if samples.len() != sample_count {
            return Err(CodecError::Encode(format!(
                "expected {sample_count} samples, got {}",
                samples.len()
            )));
        }

        let len = self
            .encoder
            .encode(&samples, &mut self.output)
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        Ok(Bytes::copy_from_slice(&self.output[..len]))
    }
}

/// Builds per-session codec state on demand.
pub trait CodecFactory: Send + Sync {
    fn decoder(&self) -> CodecResult<Box<dyn FrameDecoder>>;
    fn encoder(&self) -> CodecResult<Box<dyn FrameEncoder>>;
}

/// Factory for the Opus codecs used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpusCodecFactory;

impl CodecFactory for OpusCodecFactory {
    fn decoder(&self) -> CodecResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(OpusFrameDecoder::new()?))
    }

    fn encoder(&self) -> CodecResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(OpusFrameEncoder::new()?))
    }
}

fn sample_rate() -> CodecResult<SampleRate> {
    SampleRate::try_from(SAMPLE_RATE as i32)
        .map_err(|e| CodecError::Init(format!("Invalid sample rate {SAMPLE_RATE}: {e}")))
}

/// Interpret little-endian 16-bit PCM bytes as samples. A trailing odd byte is ignored.
pub fn bytes_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Serialize samples as little-endian 16-bit PCM.
pub fn samples_to_bytes(samples: &[i16]) -> Bytes {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    Bytes::from(out)
}
