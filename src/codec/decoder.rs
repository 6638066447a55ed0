//! PCM decoder
//!
//! Converts inbound 16-bit PCM chunks into playable f32 sample buffers,
//! validating the interleaving invariant on every chunk.

use std::time::Duration;

use crate::error::CodecError;
use crate::protocol::AudioChunk;

/// A decoded, playable audio buffer
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved f32 samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Samples per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl DecodedAudio {
    /// Playback duration of this buffer
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let instants = self.samples.len() as u64 / self.channels.max(1) as u64;
        Duration::from_micros(instants * 1_000_000 / self.sample_rate as u64)
    }
}

/// Decoder for inbound audio chunks
pub struct PcmDecoder {
    /// Chunks decoded since creation
    chunks_decoded: u64,
    /// Chunks rejected for violating the length invariant
    chunks_rejected: u64,
    /// Total samples produced
    samples_produced: u64,
}

impl PcmDecoder {
    pub fn new() -> Self {
        Self {
            chunks_decoded: 0,
            chunks_rejected: 0,
            samples_produced: 0,
        }
    }

    /// Decode a PCM chunk into f32 samples.
    ///
    /// Rejects chunks whose byte length is not a multiple of
    /// `channels * 2` and empty chunks.
    pub fn decode(&mut self, chunk: &AudioChunk) -> Result<DecodedAudio, CodecError> {
        let frame = chunk.channels.max(1) as usize * 2;
        if chunk.data.is_empty() {
            self.chunks_rejected += 1;
            return Err(CodecError::EmptyChunk);
        }
        if chunk.data.len() % frame != 0 {
            self.chunks_rejected += 1;
            return Err(CodecError::InvalidChunkLength {
                len: chunk.data.len(),
                frame,
            });
        }

        let samples: Vec<f32> = chunk
            .data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect();

        self.chunks_decoded += 1;
        self.samples_produced += samples.len() as u64;

        Ok(DecodedAudio {
            samples,
            sample_rate: chunk.sample_rate,
            channels: chunk.channels,
        })
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            chunks_decoded: self.chunks_decoded,
            chunks_rejected: self.chunks_rejected,
            samples_produced: self.samples_produced,
        }
    }

    /// Reset statistics
    pub fn reset_stats(&mut self) {
        self.chunks_decoded = 0;
        self.chunks_rejected = 0;
        self.samples_produced = 0;
    }
}

impl Default for PcmDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub chunks_decoded: u64,
    pub chunks_rejected: u64,
    pub samples_produced: u64,
}
