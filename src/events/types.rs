//! Chunk lifecycle event types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events published by the chunked encoder
///
/// The `serde(tag = "event", content = "data")` attribute creates a
/// JSON structure like:
/// ```json
/// {
///   "event": "chunk.finalized",
///   "data": { "index": 2, "path": "chunks/chunk_2.mp4", "frames": 150, ... }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChunkEvent {
    /// A new encoder/writer pair is accepting frames
    #[serde(rename = "chunk.started")]
    ChunkStarted {
        /// 1-based chunk index
        index: u32,
        /// Output file for this chunk
        path: PathBuf,
    },

    /// A chunk's file is complete and will not be touched again
    #[serde(rename = "chunk.finalized")]
    ChunkFinalized {
        index: u32,
        path: PathBuf,
        /// Frames submitted to the encoder for this chunk
        frames: u32,
        /// Encoded samples written to the container
        samples: u64,
        /// Encoded bytes written to the container
        bytes: u64,
    },

    /// The stream ended after a stop request
    #[serde(rename = "pipeline.stopped")]
    PipelineStopped {
        total_frames: u64,
        /// Chunks finalized over the lifetime of the pipeline
        chunks: u32,
    },

    /// The pipeline hit an unrecoverable error and accepts no more frames
    #[serde(rename = "pipeline.failed")]
    PipelineFailed { chunk: u32, message: String },
}

impl ChunkEvent {
    /// Get event name (for logging)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ChunkStarted { .. } => "chunk.started",
            Self::ChunkFinalized { .. } => "chunk.finalized",
            Self::PipelineStopped { .. } => "pipeline.stopped",
            Self::PipelineFailed { .. } => "pipeline.failed",
        }
    }
}
