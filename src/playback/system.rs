//! System audio output via cpal
//!
//! The sink keeps a queue of timed segments behind a mutex shared with the
//! output callback. The callback plays the front segment once its start
//! instant has arrived and fills silence otherwise, so buffers laid out
//! back-to-back by the scheduler come out seamless.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::PlaybackError;
use crate::playback::PlaybackSink;

/// One scheduled buffer awaiting playback
struct Segment {
    start: Instant,
    samples: Vec<f32>,
    pos: usize,
}

#[derive(Default)]
struct SegmentQueue {
    segments: VecDeque<Segment>,
}

impl SegmentQueue {
    /// Next output sample, or silence when nothing is due yet
    fn next_sample(&mut self, now: Instant) -> f32 {
        loop {
            let Some(front) = self.segments.front_mut() else {
                return 0.0;
            };
            if front.start > now {
                return 0.0;
            }
            if front.pos < front.samples.len() {
                let sample = front.samples[front.pos];
                front.pos += 1;
                return sample;
            }
            self.segments.pop_front();
        }
    }
}

/// cpal-backed playback sink.
///
/// Mono buffers are fanned out to every device channel; the device runs at
/// the inbound sample rate so no resampling is needed.
pub struct SystemPlayback {
    queue: Arc<Mutex<SegmentQueue>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SystemPlayback {
    /// Open the default output device at the inbound stream's rate
    pub fn new(sample_rate: u32) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::SinkError("no output device".into()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| PlaybackError::SinkError(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(PlaybackError::SinkError(format!(
                "unsupported sample format: {:?}",
                supported.sample_format()
            )));
        }
        let device_channels = supported.channels() as usize;

        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue: Arc<Mutex<SegmentQueue>> = Arc::new(Mutex::new(SegmentQueue::default()));
        let queue_cb = queue.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_loop = running.clone();

        let thread = thread::Builder::new()
            .name("call-playback".into())
            .spawn(move || {
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let now = Instant::now();
                        let mut queue = queue_cb.lock();
                        for frame in data.chunks_mut(device_channels) {
                            let sample = queue.next_sample(now);
                            for out in frame {
                                *out = sample;
                            }
                        }
                    },
                    |err| {
                        tracing::error!("playback stream error: {}", err);
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("failed to start playback stream: {}", e);
                            return;
                        }
                        while running_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to build playback stream: {}", e);
                    }
                }
            })
            .map_err(|e| PlaybackError::SinkError(e.to_string()))?;

        tracing::info!(sample_rate, "speaker playback started");

        Ok(Self {
            queue,
            running,
            thread: Some(thread),
        })
    }

    /// Audio buffered in the sink right now, in samples
    pub fn buffered_samples(&self) -> usize {
        let queue = self.queue.lock();
        queue
            .segments
            .iter()
            .map(|s| s.samples.len() - s.pos)
            .sum()
    }
}

impl PlaybackSink for SystemPlayback {
    fn schedule(&mut self, samples: Vec<f32>, start: Instant) -> Result<(), PlaybackError> {
        let mut queue = self.queue.lock();
        queue.segments.push_back(Segment {
            start,
            samples,
            pos: 0,
        });
        Ok(())
    }

    fn stop_all(&mut self) {
        let mut queue = self.queue.lock();
        queue.segments.clear();
    }
}

impl Drop for SystemPlayback {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
