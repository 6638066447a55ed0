//! Engine configuration
//!
//! Serde-backed settings with sensible voice-call defaults, loadable from
//! a TOML file under the platform config directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::Error;

/// Audio format and cadence for both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Outbound (microphone) sample rate
    pub input_sample_rate: u32,
    /// Inbound (agent reply) sample rate
    pub output_sample_rate: u32,
    /// Channel count for both directions
    pub channels: u16,
    /// Outbound chunk duration in milliseconds
    pub chunk_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            chunk_ms: DEFAULT_CHUNK_MS,
        }
    }
}

/// Video sampling cadence and compression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Interval between frame samples in milliseconds
    pub interval_ms: u32,
    /// Downscaled frame width
    pub width: u32,
    /// Downscaled frame height
    pub height: u32,
    /// JPEG quality factor (1-100)
    pub jpeg_quality: u8,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_VIDEO_INTERVAL_MS,
            width: DEFAULT_VIDEO_WIDTH,
            height: DEFAULT_VIDEO_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Complete call engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    pub audio: AudioConfig,
    pub video: VideoConfig,
    /// How long Connecting may wait for the channel to open
    pub connect_timeout_ms: u64,
    /// Playback queued beyond this is treated as an anomalous remote stream
    pub max_buffered_ms: u64,
    /// Bounded capacity of the outbound/event queues
    pub channel_capacity: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            max_buffered_ms: DEFAULT_MAX_BUFFERED_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl CallConfig {
    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Playback backpressure cap as a [`Duration`]
    pub fn max_buffered(&self) -> Duration {
        Duration::from_millis(self.max_buffered_ms)
    }

    /// Video sampling interval as a [`Duration`]
    pub fn video_interval(&self) -> Duration {
        Duration::from_millis(self.video.interval_ms as u64)
    }

    /// Samples per outbound chunk (all channels interleaved)
    pub fn chunk_samples(&self) -> usize {
        (self.audio.input_sample_rate as usize * self.audio.chunk_ms as usize / 1000)
            * self.audio.channels as usize
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let contents = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Default config file location for this platform
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "live-call-engine")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path).unwrap_or_else(|e| {
                tracing::warn!("failed to load config, using defaults: {}", e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_call_format() {
        let config = CallConfig::default();
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.audio.output_sample_rate, 24_000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.video.width, 320);
        assert_eq!(config.video.height, 240);
        // 250ms of 16kHz mono
        assert_eq!(config.chunk_samples(), 4_000);
    }

    #[test]
    fn toml_round_trip() {
        let config = CallConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: CallConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(parsed.audio.input_sample_rate, config.audio.input_sample_rate);
        assert_eq!(parsed.video.jpeg_quality, config.video.jpeg_quality);
        assert_eq!(parsed.connect_timeout_ms, config.connect_timeout_ms);
    }

    #[test]
    fn partial_file_rejected_with_config_error() {
        let err = toml::from_str::<CallConfig>("connect_timeout_ms = 5").unwrap_err();
        // Missing sections are a parse error, not silently defaulted
        assert!(err.to_string().contains("audio") || err.to_string().contains("missing"));
    }
}
