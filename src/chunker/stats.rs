//! Pipeline counters shared between the worker and observers

use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Live counters, written only by the worker
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_submitted: AtomicU64,
    frames_encoded: AtomicU64,
    frames_dropped: AtomicU64,
    samples_written: AtomicU64,
    bytes_written: AtomicU64,
    chunks_finalized: AtomicU32,
    current_chunk: AtomicU32,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub frames_submitted: u64,
    pub frames_encoded: u64,
    pub frames_dropped: u64,
    pub samples_written: u64,
    pub bytes_written: u64,
    pub chunks_finalized: u32,
    /// Index of the active chunk, 0 when none has started
    pub current_chunk: u32,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn frame_submitted(&self) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_encoded(&self) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frames_dropped(&self, count: u64) {
        self.frames_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn samples_written(&self, samples: u64, bytes: u64) {
        self.samples_written.fetch_add(samples, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn chunk_started(&self, index: u32) {
        self.current_chunk.store(index, Ordering::Relaxed);
    }

    pub(crate) fn chunk_finalized(&self) {
        self.chunks_finalized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            samples_written: self.samples_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            chunks_finalized: self.chunks_finalized.load(Ordering::Relaxed),
            current_chunk: self.current_chunk.load(Ordering::Relaxed),
        }
    }
}
