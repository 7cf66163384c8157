//! Chunked encoding pipeline
//!
//! ```text
//! producers ──submit()──► FIFO ──► worker thread
//!                                     │
//!                         ┌───────────┴────────────┐
//!                         ▼                        ▼
//!                  ChunkCoordinator ──────► DrainLoop
//!                         │                        │
//!                  ChunkSession (encoder + writer) ◄┘
//! ```
//!
//! One encoder/writer pair is live at a time. When a chunk has taken its
//! last frame the worker drains it to end of stream and releases it. The
//! next frame opens the following chunk on a freshly allocated output target.

mod actor;
mod coordinator;
mod drain;
mod session;
mod stats;
pub mod timestamp;

#[cfg(test)]
pub(crate) mod testing;

pub use actor::{ChunkedEncoder, ChunkedEncoderBuilder, PipelineStatus};
pub use coordinator::ChunkCoordinator;
pub use drain::{DrainLoop, DrainReport};
pub use session::{ChunkSession, ChunkState, ChunkSummary};
pub use stats::{PipelineStats, PipelineStatsSnapshot};
pub use timestamp::{relative_pts_us, TimestampRebaser};
