//! Error types for the call engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture-resource errors
///
/// Acquisition failures are fatal for the session and surface synchronously
/// to the caller; stream errors after that are reported asynchronously.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No audio input device available")]
    NoInputDevice,

    #[error("Capture unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to open capture stream: {0}")]
    StreamError(String),

    #[error("Capture block queue overflow")]
    QueueOverflow,
}

/// PCM framing errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Chunk byte length {len} is not a multiple of {frame} (channels * 2)")]
    InvalidChunkLength { len: usize, frame: usize },

    #[error("Chunk contains no samples")]
    EmptyChunk,
}

/// Duplex channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel open failed: {0}")]
    OpenFailed(String),

    #[error("Channel open timed out")]
    Timeout,

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Playback scheduling errors
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Playback backpressure: {queued_ms} ms already queued, chunk dropped")]
    Backpressure { queued_ms: u64 },

    #[error("Playback sink error: {0}")]
    SinkError(String),
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session has ended")]
    Ended,
}

/// Result type alias for the engine
pub type Result<T> = std::result::Result<T, Error>;
