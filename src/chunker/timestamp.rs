//! Chunk-relative presentation timestamps

/// Convert a capture time into a presentation time relative to a chunk origin
///
/// Nanoseconds in, microseconds out. A capture time before the origin yields a
/// negative value, which is passed through unchanged.
pub fn relative_pts_us(origin_ns: u64, capture_ns: u64) -> i64 {
    ((capture_ns as i128 - origin_ns as i128) / 1000) as i64
}

/// Per-chunk timestamp origin
///
/// The origin is latched from the first frame rebased after construction and
/// never recomputed; a new chunk gets a new rebaser.
#[derive(Debug, Clone, Default)]
pub struct TimestampRebaser {
    origin_ns: Option<u64>,
    last_pts_us: Option<i64>,
}

impl TimestampRebaser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Origin capture time, once the first frame has been seen
    pub fn origin_ns(&self) -> Option<u64> {
        self.origin_ns
    }

    /// Most recent relative timestamp handed out
    pub fn last_pts_us(&self) -> Option<i64> {
        self.last_pts_us
    }

    /// Rebase a capture time, latching it as the origin if none is set
    pub fn rebase(&mut self, capture_ns: u64) -> i64 {
        let origin = *self.origin_ns.get_or_insert(capture_ns);
        let pts = relative_pts_us(origin, capture_ns);
        self.last_pts_us = Some(pts);
        pts
    }
}
