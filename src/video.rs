//! Video frame sampling
//!
//! Periodically turns a raw camera frame into a small JPEG for
//! transmission. Runs on its own cadence, independent of audio.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageBuffer, Rgb};

use crate::capture::{CameraSource, RawFrame};
use crate::protocol::VideoChunk;

/// Samples, downscales and compresses camera frames.
///
/// A missing or empty camera frame is a skipped tick, never an error; the
/// capture device stays untouched between ticks.
pub struct VideoFrameSampler {
    camera: Box<dyn CameraSource>,
    width: u32,
    height: u32,
    quality: u8,
    frames_sampled: u64,
    frames_skipped: u64,
}

impl VideoFrameSampler {
    pub fn new(camera: Box<dyn CameraSource>, width: u32, height: u32, quality: u8) -> Self {
        Self {
            camera,
            width,
            height,
            quality,
            frames_sampled: 0,
            frames_skipped: 0,
        }
    }

    /// Capture one frame and compress it, or `None` when the camera has
    /// nothing to offer this tick.
    pub fn sample(&mut self) -> Option<VideoChunk> {
        let Some(frame) = self.camera.capture_frame() else {
            self.frames_skipped += 1;
            return None;
        };

        match self.compress(&frame) {
            Ok(data) => {
                self.frames_sampled += 1;
                Some(VideoChunk {
                    data: Bytes::from(data),
                    mime_type: "image/jpeg".to_string(),
                })
            }
            Err(e) => {
                self.frames_skipped += 1;
                tracing::warn!("frame compression failed, skipping tick: {}", e);
                None
            }
        }
    }

    fn compress(&self, frame: &RawFrame) -> Result<Vec<u8>, image::ImageError> {
        let buffer: ImageBuffer<Rgb<u8>, _> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.pixels.clone()).ok_or_else(
                || {
                    image::ImageError::Parameter(image::error::ParameterError::from_kind(
                        image::error::ParameterErrorKind::DimensionMismatch,
                    ))
                },
            )?;

        let scaled = if frame.width == self.width && frame.height == self.height {
            buffer
        } else {
            image::imageops::resize(&buffer, self.width, self.height, FilterType::Triangle)
        };

        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality);
        scaled.write_with_encoder(encoder)?;
        Ok(jpeg)
    }

    /// Frames compressed so far
    pub fn frames_sampled(&self) -> u64 {
        self.frames_sampled
    }

    /// Ticks skipped (no frame or compression failure)
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }
}
