//! Wire units exchanged with the session channel
//!
//! Chunks are the bounded units of media transmitted as one message over the
//! duplex channel. Audio uses fixed-rate 16-bit little-endian PCM in both
//! directions; video is an independently-paced compressed still frame. The
//! exact framing on the remote side is owned by the transport collaborator.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A bounded unit of PCM audio.
///
/// Invariant: `data.len()` is a multiple of `channels * 2` (one i16 per
/// channel per sample instant). The decoder enforces this on inbound chunks;
/// the encoder produces it by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChunk {
    /// Interleaved 16-bit little-endian PCM bytes
    pub data: Bytes,
    /// Samples per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl AudioChunk {
    /// Number of sample instants (per-channel sample count)
    pub fn sample_count(&self) -> usize {
        self.data.len() / (self.channels as usize * 2)
    }

    /// Playback duration of this chunk
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let micros = self.sample_count() as u64 * 1_000_000 / self.sample_rate as u64;
        Duration::from_micros(micros)
    }
}

/// A compressed still frame sampled from the local camera.
///
/// Not ordered relative to audio; sent on its own slower cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoChunk {
    /// Compressed image bytes
    pub data: Bytes,
    /// Image MIME type, e.g. `image/jpeg`
    pub mime_type: String,
}

/// Media sent from the session to the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundMedia {
    Audio(AudioChunk),
    Video(VideoChunk),
}

/// Events delivered by the channel to the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelEvent {
    /// A chunk of agent reply audio to schedule for playback
    Audio(AudioChunk),
    /// The remote agent barged in; discard all queued but unplayed audio
    Interrupted,
    /// The remote endpoint closed the channel (graceful end)
    Closed { reason: Option<String> },
    /// Transport-level failure
    Error { detail: String },
}
