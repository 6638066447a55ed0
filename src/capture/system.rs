//! System microphone capture via cpal
//!
//! A dedicated thread owns the input stream (cpal streams are not `Send`);
//! the device callback accumulates samples into chunk-sized blocks and
//! hands them to the async side over a bounded queue. A full queue drops
//! the block rather than stalling the device callback.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::capture::{CaptureGuard, CaptureHandle, MediaCapture};
use crate::constants::CAPTURE_QUEUE_BLOCKS;
use crate::error::CaptureError;
use tokio::sync::mpsc;

/// cpal-backed microphone capture.
///
/// Captures mono f32 at the requested rate and yields blocks of
/// `chunk_ms` worth of samples. There is no camera backend; acquiring with
/// `wants_video` yields a handle without a camera source, so the video
/// sampler skips every tick.
pub struct SystemCapture {
    sample_rate: u32,
    channels: u16,
    chunk_ms: u32,
}

impl SystemCapture {
    pub fn new(sample_rate: u32, channels: u16, chunk_ms: u32) -> Self {
        Self {
            sample_rate,
            channels,
            chunk_ms,
        }
    }

    fn block_len(&self) -> usize {
        (self.sample_rate as usize * self.chunk_ms as usize / 1000) * self.channels as usize
    }
}

/// Keeps the capture thread alive; dropping it stops the stream
struct StreamResource {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for StreamResource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl MediaCapture for SystemCapture {
    fn acquire(&self, wants_video: bool) -> Result<CaptureHandle, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(CaptureError::Unavailable(format!(
                "unsupported sample format: {:?}",
                supported.sample_format()
            )));
        }

        let config = StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (block_tx, block_rx) = mpsc::channel(CAPTURE_QUEUE_BLOCKS);
        let (error_tx, error_rx) = bounded::<CaptureError>(16);

        let running = Arc::new(AtomicBool::new(true));
        let running_cb = running.clone();
        let running_loop = running.clone();
        let block_len = self.block_len();
        let dropped_blocks = Arc::new(AtomicU64::new(0));
        let dropped_cb = dropped_blocks.clone();
        let error_tx_data = error_tx.clone();
        let error_tx_cb = error_tx.clone();

        let thread = thread::Builder::new()
            .name("call-capture".into())
            .spawn(move || {
                let mut pending: Vec<f32> = Vec::with_capacity(block_len);

                let stream = device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running_cb.load(Ordering::Relaxed) {
                            return;
                        }
                        for &sample in data {
                            pending.push(sample);
                            if pending.len() == block_len {
                                let block = std::mem::replace(
                                    &mut pending,
                                    Vec::with_capacity(block_len),
                                );
                                if block_tx.try_send(block).is_err() {
                                    dropped_cb.fetch_add(1, Ordering::Relaxed);
                                    let _ = error_tx_data.try_send(CaptureError::QueueOverflow);
                                }
                            }
                        }
                    },
                    move |err| {
                        let _ = error_tx_cb.try_send(CaptureError::StreamError(err.to_string()));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            let _ = error_tx.try_send(CaptureError::StreamError(e.to_string()));
                            return;
                        }
                        while running_loop.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(10));
                        }
                        // Stream drops here, stopping capture
                    }
                    Err(e) => {
                        let _ = error_tx.try_send(CaptureError::StreamError(e.to_string()));
                    }
                }
            })
            .map_err(|e| CaptureError::StreamError(e.to_string()))?;

        tracing::info!(
            sample_rate = self.sample_rate,
            channels = self.channels,
            chunk_ms = self.chunk_ms,
            "microphone capture started"
        );
        if wants_video {
            tracing::warn!("video requested but no camera backend is available; frames will be skipped");
        }

        Ok(CaptureHandle {
            blocks: block_rx,
            camera: None,
            guard: CaptureGuard::new(Box::new(StreamResource {
                running,
                thread: Some(thread),
            })),
            errors: Some(error_rx),
        })
    }
}
