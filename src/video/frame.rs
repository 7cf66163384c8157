//! Video frame data structures

use bytes::Bytes;
use std::sync::OnceLock;
use std::time::Instant;

/// A raw video frame handed to the pipeline by the capture source
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw pixel data
    data: Bytes,
    /// Capture time in nanoseconds on a monotonic clock
    pub capture_ns: u64,
}

impl VideoFrame {
    /// Create a new video frame
    pub fn new(data: Bytes, capture_ns: u64) -> Self {
        Self { data, capture_ns }
    }

    /// Create a frame from a Vec<u8>
    pub fn from_vec(data: Vec<u8>, capture_ns: u64) -> Self {
        Self::new(Bytes::from(data), capture_ns)
    }

    /// Create a frame stamped with the current monotonic time
    pub fn now(data: Bytes) -> Self {
        Self::new(data, monotonic_ns())
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Get data length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Nanoseconds elapsed on a process-wide monotonic clock
pub fn monotonic_ns() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}
