//! PCM encoder
//!
//! Converts captured f32 samples in [-1, 1] into interleaved 16-bit
//! little-endian PCM chunks for transmission.

use bytes::Bytes;

use crate::protocol::AudioChunk;

/// Encoder for outbound audio chunks.
///
/// Pure conversion: no shared state and no failure modes. Samples at or
/// above 1.0 clamp to `i16::MAX` instead of wrapping to negative.
pub struct PcmEncoder {
    sample_rate: u32,
    channels: u16,
    /// Frames encoded since creation
    frames_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl PcmEncoder {
    /// Create an encoder for the given outbound format
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            frames_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Encode interleaved f32 samples into a PCM chunk
    pub fn encode(&mut self, samples: &[f32]) -> AudioChunk {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            data.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
        }

        self.frames_encoded += 1;
        self.bytes_produced += data.len() as u64;

        AudioChunk {
            data: Bytes::from(data),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Get sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get channel count
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
        }
    }

    /// Reset statistics
    pub fn reset_stats(&mut self) {
        self.frames_encoded = 0;
        self.bytes_produced = 0;
    }
}

/// Convert one f32 sample to a clamped 16-bit value
fn sample_to_i16(sample: f32) -> i16 {
    let scaled = (sample * 32767.0).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
}
