//! Media format definitions shared by encoder and container writer

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mime type of the H.264 elementary stream
pub const MIME_AVC: &str = "video/avc";

/// Raw input color layout accepted by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorFormat {
    /// Frames arrive through an opaque input surface
    Surface,
    /// YUV420 planar (I420)
    Yuv420Planar,
    /// YUV420 semi-planar (NV12)
    Yuv420SemiPlanar,
}

impl ColorFormat {
    /// Expected raw frame size for a given resolution
    /// Returns None when the layout is opaque
    pub fn frame_size(&self, resolution: Resolution) -> Option<usize> {
        let pixels = resolution.pixels() as usize;
        match self {
            ColorFormat::Surface => None,
            ColorFormat::Yuv420Planar | ColorFormat::Yuv420SemiPlanar => Some(pixels * 3 / 2),
        }
    }
}

impl fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorFormat::Surface => "SURFACE",
            ColorFormat::Yuv420Planar => "I420",
            ColorFormat::Yuv420SemiPlanar => "NV12",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for ColorFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SURFACE" => Ok(ColorFormat::Surface),
            "I420" | "YUV420" | "YUV420P" => Ok(ColorFormat::Yuv420Planar),
            "NV12" | "YUV420SP" => Ok(ColorFormat::Yuv420SemiPlanar),
            _ => Err(format!("Unknown color format: {}", s)),
        }
    }
}

/// Resolution (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Check if resolution is usable by an encoder
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.width % 2 == 0 && self.height % 2 == 0
    }

    /// Get total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Common resolutions
    pub const VGA: Resolution = Resolution {
        width: 640,
        height: 480,
    };
    pub const HD720: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
    pub const HD1080: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Track format negotiated between the encoder and the container writer
///
/// The pipeline builds one from configuration for `configure`; the encoder
/// reports its own (with codec-specific data attached) once output starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub mime: String,
    pub resolution: Resolution,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    pub frame_rate: u32,
    /// Seconds between key frames
    pub keyframe_interval_secs: u32,
    pub color_format: ColorFormat,
    /// Codec-specific data (SPS/PPS for AVC), empty until the encoder reports it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub csd: Vec<Bytes>,
}

impl MediaFormat {
    /// Create a video format with the recorder defaults
    pub fn video(mime: &str, resolution: Resolution) -> Self {
        Self {
            mime: mime.to_string(),
            resolution,
            bitrate: 250_000,
            frame_rate: 30,
            keyframe_interval_secs: 5,
            color_format: ColorFormat::Surface,
            csd: Vec::new(),
        }
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    pub fn with_keyframe_interval(mut self, secs: u32) -> Self {
        self.keyframe_interval_secs = secs;
        self
    }

    pub fn with_color_format(mut self, color_format: ColorFormat) -> Self {
        self.color_format = color_format;
        self
    }

    pub fn with_csd(mut self, csd: Bytes) -> Self {
        self.csd.push(csd);
        self
    }

    /// Key frame interval expressed in frames (at least 1)
    pub fn keyframe_interval_frames(&self) -> u64 {
        (self.keyframe_interval_secs as u64 * self.frame_rate as u64).max(1)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} fps, {} bps, gop {}s, {}",
            self.mime,
            self.resolution,
            self.frame_rate,
            self.bitrate,
            self.keyframe_interval_secs,
            self.color_format
        )?;
        if !self.csd.is_empty() {
            write!(f, ", {} csd", self.csd.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        assert_eq!(
            ColorFormat::Yuv420SemiPlanar.frame_size(Resolution::VGA),
            Some(640 * 480 * 3 / 2)
        );
        assert_eq!(ColorFormat::Surface.frame_size(Resolution::VGA), None);
    }

    #[test]
    fn test_color_format_parse() {
        assert_eq!("nv12".parse::<ColorFormat>(), Ok(ColorFormat::Yuv420SemiPlanar));
        assert_eq!("I420".parse::<ColorFormat>(), Ok(ColorFormat::Yuv420Planar));
        assert!("rgb".parse::<ColorFormat>().is_err());
    }

    #[test]
    fn test_keyframe_interval_frames() {
        let format = MediaFormat::video(MIME_AVC, Resolution::VGA);
        assert_eq!(format.keyframe_interval_frames(), 150);

        let format = format.with_keyframe_interval(0);
        assert_eq!(format.keyframe_interval_frames(), 1);
    }

    #[test]
    fn test_format_json_keeps_csd() {
        let format = MediaFormat::video(MIME_AVC, Resolution::HD720)
            .with_csd(Bytes::from_static(&[0, 0, 0, 1, 0x67]));
        let json = serde_json::to_string(&format).unwrap();
        let parsed: MediaFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, format);
        assert!(format.to_string().contains("1 csd"));
    }
}
