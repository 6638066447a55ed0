//! Playback scheduler
//!
//! Tracks a monotonically advancing "next start" instant instead of playing
//! chunks the moment they arrive. Consecutive chunks are laid out
//! back-to-back, so jittery delivery still produces seamless audio, and an
//! interruption discards everything that has not been heard yet.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::codec::PcmDecoder;
use crate::error::PlaybackError;
use crate::playback::PlaybackSink;
use crate::protocol::AudioChunk;

/// A chunk scheduled on the virtual timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackUnit {
    /// When the sink starts playing this chunk
    pub scheduled_start: Instant,
    /// Playback length of the chunk
    pub duration: Duration,
}

impl PlaybackUnit {
    /// When this unit finishes playing
    pub fn end(&self) -> Instant {
        self.scheduled_start + self.duration
    }
}

/// Gap-free scheduler over a playback sink.
///
/// Exclusively owns the virtual playback clock and the pending-unit queue;
/// the session only ever calls [`enqueue`](Self::enqueue),
/// [`interrupt`](Self::interrupt) and the read-only accessors.
pub struct PlaybackScheduler<S: PlaybackSink> {
    sink: S,
    decoder: PcmDecoder,
    /// Next available start instant; `None` until the first chunk (and
    /// after an interruption), which makes the next chunk start at now
    clock: Option<Instant>,
    /// Scheduled but not yet finished units, in delivery order
    pending: VecDeque<PlaybackUnit>,
    /// Maximum audio allowed ahead of real time before chunks are dropped
    max_buffered: Duration,
    /// Set when the remote stream outpaces real time
    degraded: bool,
    chunks_scheduled: u64,
    chunks_dropped: u64,
    interruptions: u64,
}

impl<S: PlaybackSink> PlaybackScheduler<S> {
    pub fn new(sink: S, max_buffered: Duration) -> Self {
        Self {
            sink,
            decoder: PcmDecoder::new(),
            clock: None,
            pending: VecDeque::new(),
            max_buffered,
            degraded: false,
            chunks_scheduled: 0,
            chunks_dropped: 0,
            interruptions: 0,
        }
    }

    /// Schedule a chunk for gap-free playback.
    ///
    /// The start is `max(clock, now)`: a stale clock snaps forward so the
    /// first chunk after silence never waits. When the queue is already
    /// more than `max_buffered` ahead of real time the chunk is dropped
    /// deterministically, the clock does not advance, and the scheduler
    /// reports [`PlaybackError::Backpressure`] until playback drains.
    pub fn enqueue(&mut self, chunk: &AudioChunk) -> Result<PlaybackUnit, PlaybackError> {
        let now = Instant::now();
        self.prune(now);

        let start = match self.clock {
            Some(clock) if clock > now => clock,
            _ => now,
        };

        let queued = start - now;
        if queued > self.max_buffered {
            self.chunks_dropped += 1;
            self.degraded = true;
            let queued_ms = queued.as_millis() as u64;
            tracing::warn!(queued_ms, "playback falling behind, dropping chunk");
            return Err(PlaybackError::Backpressure { queued_ms });
        }

        let decoded = self
            .decoder
            .decode(chunk)
            .map_err(|e| PlaybackError::SinkError(e.to_string()))?;
        let duration = decoded.duration();

        self.sink.schedule(decoded.samples, start)?;

        let unit = PlaybackUnit {
            scheduled_start: start,
            duration,
        };
        self.clock = Some(start + duration);
        self.pending.push_back(unit);
        self.chunks_scheduled += 1;
        self.degraded = false;

        Ok(unit)
    }

    /// Barge-in: stop everything playing or queued and reset the timeline.
    ///
    /// Audio already received but not yet heard must never play after this.
    pub fn interrupt(&mut self) {
        self.sink.stop_all();
        self.pending.clear();
        self.clock = None;
        self.degraded = false;
        self.interruptions += 1;
        tracing::debug!("playback interrupted, queue cleared");
    }

    /// Interrupt and reset all counters
    pub fn reset(&mut self) {
        self.interrupt();
        self.chunks_scheduled = 0;
        self.chunks_dropped = 0;
        self.interruptions = 0;
        self.decoder.reset_stats();
    }

    /// Drop units whose playback has finished
    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.pending.front() {
            if front.end() <= now {
                self.pending.pop_front();
            } else {
                break;
            }
        }
    }

    /// Audio queued ahead of real time right now
    pub fn queued(&self) -> Duration {
        match self.clock {
            Some(clock) => clock.saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    /// Number of scheduled-but-unfinished units
    pub fn pending_len(&mut self) -> usize {
        self.prune(Instant::now());
        self.pending.len()
    }

    /// Whether the remote stream has outpaced playback
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Get statistics
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            chunks_scheduled: self.chunks_scheduled,
            chunks_dropped: self.chunks_dropped,
            interruptions: self.interruptions,
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub chunks_scheduled: u64,
    pub chunks_dropped: u64,
    pub interruptions: u64,
}
