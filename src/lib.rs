//! # Live Call Engine
//!
//! Low-latency bidirectional call session engine: streams microphone audio
//! (and optional camera stills) to a remote conversational agent and plays
//! the agent's streamed audio replies back without gaps, including mid-reply
//! interruption ("barge-in") handling.
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌────────────┐    f32 blocks   ┌────────────┐  AudioChunk   ┌─────────────┐
//!  │ Microphone ├────────────────▶│ PcmEncoder ├──────────────▶│             │
//!  └────────────┘   (capture)     └────────────┘   send loop   │             │
//!                                                              │   Session   │
//!  ┌────────────┐   RawFrame      ┌────────────┐  VideoChunk   │   Channel   │
//!  │  Camera    ├────────────────▶│ FrameSampl.├──────────────▶│  (duplex)   │
//!  └────────────┘  (1s cadence)   └────────────┘  video loop   │             │
//!                                                              │             │
//!  ┌────────────┐   scheduled     ┌────────────┐  ChannelEvent │             │
//!  │  Speaker   │◀────────────────┤ Playback   │◀──────────────┤             │
//!  └────────────┘    buffers      │ Scheduler  │   recv loop   └─────────────┘
//!                                 └────────────┘
//! ```
//!
//! The [`session::CallSession`] owns all three concurrent loops plus the
//! capture resource and the channel handle; the scheduler exclusively owns
//! the virtual playback clock. Each piece of mutable state has exactly one
//! owner, so cross-component coordination happens only through method calls.

pub mod capture;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod video;

pub use error::{Error, Result};

/// Engine-wide constants
pub mod constants {
    /// Sample rate for outbound (microphone) audio
    pub const INPUT_SAMPLE_RATE: u32 = 16_000;

    /// Sample rate for inbound (agent reply) audio
    pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

    /// Channel count for both directions (mono voice)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Duration of one outbound audio chunk in milliseconds
    pub const DEFAULT_CHUNK_MS: u32 = 250;

    /// Interval between video frame samples in milliseconds
    pub const DEFAULT_VIDEO_INTERVAL_MS: u32 = 1_000;

    /// Downscaled still-frame width in pixels
    pub const DEFAULT_VIDEO_WIDTH: u32 = 320;

    /// Downscaled still-frame height in pixels
    pub const DEFAULT_VIDEO_HEIGHT: u32 = 240;

    /// JPEG quality factor, tuned for bandwidth over fidelity
    pub const DEFAULT_JPEG_QUALITY: u8 = 50;

    /// How long to wait for the channel to open before giving up
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

    /// Maximum audio queued ahead of real time before chunks are dropped
    pub const DEFAULT_MAX_BUFFERED_MS: u64 = 5_000;

    /// Bounded capacity of the outbound/event queues
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

    /// Capacity of the capture block queue (blocks, not samples)
    pub const CAPTURE_QUEUE_BLOCKS: usize = 8;
}
