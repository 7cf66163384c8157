use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::video::format::{ColorFormat, MediaFormat, Resolution, MIME_AVC};

/// Chunked encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Length of each chunk in seconds
    pub chunk_duration_secs: u32,
    /// Capture frame rate
    pub fps: u32,
    /// Explicit frames per chunk, overriding duration * fps
    pub frames_per_chunk: Option<u32>,
    /// Encoder input/output settings
    pub video: VideoConfig,
    /// Encoder output polling
    pub drain: DrainConfig,
    /// Where chunk files go
    pub output: OutputConfig,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_duration_secs: 5,
            fps: 30,
            frames_per_chunk: None,
            video: VideoConfig::default(),
            drain: DrainConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl ChunkerConfig {
    /// Number of frames that make up one chunk
    pub fn frames_per_chunk(&self) -> u32 {
        self.frames_per_chunk
            .unwrap_or(self.chunk_duration_secs.saturating_mul(self.fps))
    }

    /// Check the configuration can drive a pipeline
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(AppError::Config("fps must be greater than zero".to_string()));
        }
        if self.frames_per_chunk() == 0 {
            return Err(AppError::Config(
                "frames per chunk must be greater than zero".to_string(),
            ));
        }
        if !self.video.resolution().is_valid() {
            return Err(AppError::Config(format!(
                "invalid video resolution {}",
                self.video.resolution()
            )));
        }
        if self.video.mime.is_empty() {
            return Err(AppError::Config("video mime type is empty".to_string()));
        }
        if self.drain.poll_timeout_ms == 0 {
            return Err(AppError::Config("drain poll timeout must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Format handed to the encoder's `configure`
    pub fn to_media_format(&self) -> MediaFormat {
        MediaFormat::video(&self.video.mime, self.video.resolution())
            .with_bitrate(self.video.bitrate)
            .with_frame_rate(self.fps)
            .with_keyframe_interval(self.video.keyframe_interval_secs)
            .with_color_format(self.video.color_format)
    }
}

/// Video encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub mime: String,
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Seconds between key frames
    pub keyframe_interval_secs: u32,
    pub color_format: ColorFormat,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            mime: MIME_AVC.to_string(),
            width: 640,
            height: 480,
            bitrate: 250_000,
            keyframe_interval_secs: 5,
            color_format: ColorFormat::Surface,
        }
    }
}

impl VideoConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Encoder output drain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Bound on a single output poll
    pub poll_timeout_ms: u64,
    /// Bound on waiting for end of stream; 0 waits forever
    pub eos_timeout_ms: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 10,
            eos_timeout_ms: 10_000,
        }
    }
}

impl DrainConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn eos_timeout(&self) -> Option<Duration> {
        (self.eos_timeout_ms > 0).then(|| Duration::from_millis(self.eos_timeout_ms))
    }
}

/// Chunk file naming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
    pub file_prefix: String,
    pub extension: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "chunks".to_string(),
            file_prefix: "chunk_".to_string(),
            extension: "mp4".to_string(),
        }
    }
}
