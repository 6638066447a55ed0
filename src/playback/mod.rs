//! Playback subsystem: gap-free scheduling of inbound audio
//!
//! The scheduler lays decoded chunks out back-to-back on a virtual
//! timeline; the sink realizes those buffers on the audio device.

pub mod scheduler;
pub mod system;

use std::time::Instant;

use crate::error::PlaybackError;

pub use scheduler::{PlaybackScheduler, PlaybackUnit, SchedulerStats};
pub use system::SystemPlayback;

/// Audio output consumed by the scheduler.
///
/// `schedule` must start the buffer at exactly `start` (device-level
/// precision, not best-effort); `stop_all` silences everything immediately,
/// including buffers whose start time has not arrived yet.
pub trait PlaybackSink: Send {
    fn schedule(&mut self, samples: Vec<f32>, start: Instant) -> Result<(), PlaybackError>;
    fn stop_all(&mut self);
}
