//! Audio framing and transcoding between the device and the agent backend.
//!
//! Devices speak Opus in fixed 60 ms frames; agent backends speak raw PCM.
//! Both sides run at 16 kHz mono, 16-bit little-endian.
//!
//! # Frame Geometry
//!
//! | quantity | value |
//! |---|---|
//! | sample rate | 16000 Hz |
//! | channels | 1 |
//! | frame duration | 60 ms |
//! | samples per frame | 960 |
//! | PCM bytes per frame | 1920 |
//! | pre-buffer threshold | 3840 bytes (two frames) |

mod codec;

pub use codec::{
    CodecError, CodecFactory, CodecResult, FrameDecoder, FrameEncoder, OpusCodecFactory,
    OpusFrameDecoder, OpusFrameEncoder, bytes_to_samples, samples_to_bytes,
};

/// Sample rate shared by the device and the backend.
pub const SAMPLE_RATE: u32 = 16_000;

/// Channel count shared by the device and the backend.
pub const CHANNELS: u8 = 1;

/// Declared duration of one device frame in milliseconds.
pub const FRAME_DURATION_MS: u64 = 60;

/// Samples per channel in one device frame.
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize / 1000) * FRAME_DURATION_MS as usize;

/// PCM bytes in one device frame (16-bit samples).
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Buffered PCM required before agent playback starts.
pub const PRE_BUFFER_BYTES: usize = FRAME_BYTES * 2;
