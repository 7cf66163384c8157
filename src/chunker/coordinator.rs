//! Chunk rotation
//!
//! Owns the single live [`ChunkSession`] and moves the pipeline from one chunk
//! to the next: allocate a target, open a session on it, feed it frames, and
//! finalize it once the terminal unit has been drained.

use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::drain::{DrainLoop, DrainReport};
use super::session::{ChunkSession, ChunkState, ChunkSummary};
use super::stats::PipelineStats;
use crate::error::{AppError, Result};
use crate::events::{ChunkEvent, EventBus};
use crate::video::encoder::EncoderFactory;
use crate::video::format::MediaFormat;
use crate::video::frame::VideoFrame;
use crate::video::muxer::WriterFactory;
use crate::video::output::OutputAllocator;

pub struct ChunkCoordinator {
    format: MediaFormat,
    encoders: Arc<dyn EncoderFactory>,
    writers: Arc<dyn WriterFactory>,
    allocator: Box<dyn OutputAllocator>,
    drain: DrainLoop,
    current: Option<ChunkSession>,
    /// Index of the most recently started chunk
    chunk_index: u32,
    events: EventBus,
    stats: Arc<PipelineStats>,
}

impl ChunkCoordinator {
    pub fn new(
        format: MediaFormat,
        encoders: Arc<dyn EncoderFactory>,
        writers: Arc<dyn WriterFactory>,
        allocator: Box<dyn OutputAllocator>,
        drain: DrainLoop,
        events: EventBus,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            format,
            encoders,
            writers,
            allocator,
            drain,
            current: None,
            chunk_index: 0,
            events,
            stats,
        }
    }

    /// Index of the most recently started chunk, 0 before the first
    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    pub fn active(&self) -> Option<&ChunkSession> {
        self.current.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut ChunkSession> {
        self.current.as_mut()
    }

    /// State of the current chunk
    pub fn state(&self) -> ChunkState {
        self.current
            .as_ref()
            .map(|session| session.state())
            .unwrap_or(ChunkState::Inactive)
    }

    /// Allocate a target and open a fresh encoder/writer pair on it
    pub fn start_chunk(&mut self, index: u32) -> Result<()> {
        if let Some(active) = &self.current {
            return Err(AppError::Encoder(format!(
                "cannot start chunk {} while chunk {} is {}",
                index,
                active.index(),
                active.state()
            )));
        }

        let target = self.allocator.allocate(index)?;
        let path = target.path.clone();
        let session = ChunkSession::open(
            index,
            target,
            self.encoders.as_ref(),
            self.writers.as_ref(),
            &self.format,
        )?;

        self.current = Some(session);
        self.chunk_index = index;
        self.stats.chunk_started(index);
        self.events.publish(ChunkEvent::ChunkStarted { index, path });
        Ok(())
    }

    pub fn start_next_chunk(&mut self) -> Result<()> {
        self.start_chunk(self.chunk_index + 1)
    }

    /// Drain pending output, then queue one frame into the active chunk
    ///
    /// An exhausted input pool is relieved by draining and retrying, so this
    /// blocks rather than drop the frame.
    pub fn encode_frame(&mut self, frame: &VideoFrame, pts_us: i64, end_of_stream: bool) -> Result<()> {
        let Self {
            current,
            drain,
            stats,
            ..
        } = self;
        let session = current
            .as_mut()
            .ok_or_else(|| AppError::Encoder("no active chunk to encode into".to_string()))?;

        Self::drain_session(drain, stats, session, false)?;
        while !session.queue_frame(frame, pts_us, end_of_stream)? {
            trace!("Chunk {}: input buffers exhausted, draining", session.index());
            Self::drain_session(drain, stats, session, false)?;
        }
        stats.frame_encoded();
        Ok(())
    }

    /// Signal end of stream if needed, drain to it, and release the chunk
    ///
    /// Returns `None` when no chunk is active. On failure the chunk's sessions
    /// are released and the chunk is gone.
    pub fn finalize_chunk(&mut self) -> Result<Option<ChunkSummary>> {
        let Some(mut session) = self.current.take() else {
            return Ok(None);
        };

        if session.state() == ChunkState::Active && !session.eos_observed() {
            while !session.signal_end_of_stream()? {
                Self::drain_session(&mut self.drain, &self.stats, &mut session, false)?;
            }
        }
        Self::drain_session(&mut self.drain, &self.stats, &mut session, true)?;

        let summary = session.finish()?;
        self.stats.chunk_finalized();
        info!(
            "Chunk {} finalized: {} frames, {} samples, {} bytes -> {}",
            summary.index,
            summary.frames,
            summary.samples,
            summary.bytes,
            summary.target.path.display()
        );
        if !summary.writer_started {
            debug!("Chunk {} produced no output format, writer never started", summary.index);
        }

        self.events.publish(ChunkEvent::ChunkFinalized {
            index: summary.index,
            path: summary.target.path.clone(),
            frames: summary.frames,
            samples: summary.samples,
            bytes: summary.bytes,
        });
        Ok(Some(summary))
    }

    /// Release the active chunk without draining it
    pub fn abort(&mut self) {
        if let Some(session) = self.current.take() {
            warn!("Aborting chunk {} ({})", session.index(), session.state());
            drop(session);
        }
    }

    fn drain_session(
        drain: &mut DrainLoop,
        stats: &PipelineStats,
        session: &mut ChunkSession,
        end_of_stream: bool,
    ) -> Result<DrainReport> {
        let report = drain.drain(session, end_of_stream)?;
        if report.samples > 0 {
            stats.samples_written(report.samples, report.bytes);
        }
        Ok(report)
    }
}
