//! Encoder/writer pair owned by one chunk

use tracing::{debug, info, trace, warn};

use super::timestamp::TimestampRebaser;
use crate::error::{AppError, Result};
use crate::video::encoder::{BufferFlags, BufferInfo, EncoderFactory, HardwareEncoder, InputSlot};
use crate::video::format::MediaFormat;
use crate::video::frame::VideoFrame;
use crate::video::muxer::{ContainerWriter, WriterFactory};
use crate::video::output::OutputTarget;

/// Lifecycle of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// No encoder/writer pair exists
    Inactive,
    /// Accepting frames
    Active,
    /// End of stream has been queued to the encoder
    Draining,
    /// Both collaborators stopped and released
    Finalized,
}

impl std::fmt::Display for ChunkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkState::Inactive => write!(f, "inactive"),
            ChunkState::Active => write!(f, "active"),
            ChunkState::Draining => write!(f, "draining"),
            ChunkState::Finalized => write!(f, "finalized"),
        }
    }
}

/// What a finalized chunk produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub index: u32,
    pub target: OutputTarget,
    pub frames: u32,
    pub samples: u64,
    pub bytes: u64,
    /// Whether the container was ever started
    pub writer_started: bool,
}

/// One chunk's live encoder and container writer
///
/// Both collaborators are acquired together by [`ChunkSession::open`] and
/// released together by [`ChunkSession::finish`]. Dropping an unfinished
/// session releases both without stopping them.
pub struct ChunkSession {
    index: u32,
    target: OutputTarget,
    encoder: Box<dyn HardwareEncoder>,
    writer: Box<dyn ContainerWriter>,
    track: Option<usize>,
    writer_started: bool,
    state: ChunkState,
    frame_count: u32,
    rebaser: TimestampRebaser,
    eos_observed: bool,
    samples_written: u64,
    bytes_written: u64,
}

impl ChunkSession {
    /// Create, configure and start an encoder, then open a writer on `target`
    pub fn open(
        index: u32,
        target: OutputTarget,
        encoders: &dyn EncoderFactory,
        writers: &dyn WriterFactory,
        format: &MediaFormat,
    ) -> Result<Self> {
        let mut encoder = encoders.create()?;
        if let Err(e) = encoder.configure(format).and_then(|_| encoder.start()) {
            encoder.release();
            return Err(e);
        }

        let writer = match writers.open(&target) {
            Ok(writer) => writer,
            Err(e) => {
                if let Err(stop_err) = encoder.stop() {
                    debug!("Encoder stop after writer failure: {}", stop_err);
                }
                encoder.release();
                return Err(e);
            }
        };

        info!(
            "Chunk {} started: {} -> {}",
            index,
            encoder.name(),
            target.path.display()
        );

        Ok(Self {
            index,
            target,
            encoder,
            writer,
            track: None,
            writer_started: false,
            state: ChunkState::Active,
            frame_count: 0,
            rebaser: TimestampRebaser::new(),
            eos_observed: false,
            samples_written: 0,
            bytes_written: 0,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn writer_started(&self) -> bool {
        self.writer_started
    }

    pub fn eos_observed(&self) -> bool {
        self.eos_observed
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub(crate) fn encoder_mut(&mut self) -> &mut dyn HardwareEncoder {
        self.encoder.as_mut()
    }

    /// Count a frame against this chunk and compute its presentation time
    ///
    /// Returns the chunk's frame count including this frame.
    pub fn record_frame(&mut self, capture_ns: u64) -> (u32, i64) {
        self.frame_count += 1;
        (self.frame_count, self.rebaser.rebase(capture_ns))
    }

    /// Copy a frame into a free input buffer and queue it
    ///
    /// Returns `false` without queueing when no input buffer is free.
    pub fn queue_frame(&mut self, frame: &VideoFrame, pts_us: i64, end_of_stream: bool) -> Result<bool> {
        self.queue_input(frame.data(), pts_us, end_of_stream)
    }

    /// Queue an empty end-of-stream input
    pub fn signal_end_of_stream(&mut self) -> Result<bool> {
        let pts_us = self.rebaser.last_pts_us().unwrap_or(0);
        self.queue_input(&[], pts_us, true)
    }

    fn queue_input(&mut self, payload: &[u8], pts_us: i64, end_of_stream: bool) -> Result<bool> {
        if self.state != ChunkState::Active {
            return Err(AppError::Encoder(format!(
                "chunk {} is {} and cannot accept input",
                self.index, self.state
            )));
        }

        let index = match self.encoder.dequeue_input_buffer(None)? {
            InputSlot::Ready(index) => index,
            InputSlot::WouldBlock => return Ok(false),
        };
        let buffer = self.encoder.input_buffer(index).ok_or_else(|| {
            AppError::Encoder(format!("encoder input buffer {} unavailable", index))
        })?;
        buffer.clear();
        buffer.extend_from_slice(payload);

        let flags = if end_of_stream {
            BufferFlags::END_OF_STREAM
        } else {
            BufferFlags::NONE
        };
        self.encoder
            .queue_input_buffer(index, 0, payload.len(), pts_us, flags)?;

        if end_of_stream {
            debug!("Chunk {}: end of stream queued at pts {}", self.index, pts_us);
            self.state = ChunkState::Draining;
        } else {
            trace!("Chunk {}: queued {} bytes at pts {}", self.index, payload.len(), pts_us);
        }
        Ok(true)
    }

    /// Add the encoder's output format as a track and start the writer
    pub fn on_format_changed(&mut self) -> Result<()> {
        if self.writer_started || self.track.is_some() {
            return Err(AppError::FormatChangedTwice { chunk: self.index });
        }
        let format = self.encoder.output_format()?;
        info!("Chunk {}: encoder output format changed: {}", self.index, format);

        self.track = Some(self.writer.add_track(&format)?);
        self.writer.start()?;
        self.writer_started = true;
        Ok(())
    }

    /// Forward one encoded sample to the writer
    pub fn write_sample(&mut self, data: &[u8], info: &BufferInfo) -> Result<()> {
        let track = match self.track {
            Some(track) if self.writer_started => track,
            _ => return Err(AppError::WriterNotStarted { chunk: self.index }),
        };
        self.writer.write_sample_data(track, data, info)?;
        self.samples_written += 1;
        self.bytes_written += data.len() as u64;
        trace!(
            "Chunk {}: wrote {} bytes pts {} flags {}",
            self.index,
            data.len(),
            info.presentation_time_us,
            info.flags
        );
        Ok(())
    }

    pub(crate) fn mark_eos_observed(&mut self) {
        self.eos_observed = true;
    }

    /// Stop and release both collaborators
    ///
    /// Every release runs even if an earlier stop fails; the first failure is
    /// returned.
    pub fn finish(mut self) -> Result<ChunkSummary> {
        let mut first_error = None;

        if let Err(e) = self.encoder.stop() {
            warn!("Chunk {}: encoder stop failed: {}", self.index, e);
            first_error.get_or_insert(e);
        }
        self.encoder.release();

        if self.writer_started {
            if let Err(e) = self.writer.stop() {
                warn!("Chunk {}: writer stop failed: {}", self.index, e);
                first_error.get_or_insert(e);
            }
        }
        self.writer.release();
        self.state = ChunkState::Finalized;

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(ChunkSummary {
            index: self.index,
            target: self.target.clone(),
            frames: self.frame_count,
            samples: self.samples_written,
            bytes: self.bytes_written,
            writer_started: self.writer_started,
        })
    }
}

impl Drop for ChunkSession {
    fn drop(&mut self) {
        if self.state != ChunkState::Finalized {
            warn!("Chunk {} released without finalize ({})", self.index, self.state);
            self.encoder.release();
            self.writer.release();
            self.state = ChunkState::Finalized;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::testing::{EncoderLog, FaultyEncoderFactory, RecordingWriterFactory};
    use crate::video::format::{Resolution, MIME_AVC};

    fn format() -> MediaFormat {
        MediaFormat::video(MIME_AVC, Resolution::VGA)
    }

    fn target(index: u32) -> OutputTarget {
        OutputTarget::new(index, format!("mem://chunk_{}", index))
    }

    #[test]
    fn test_open_and_finish_empty() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::default();

        let session = ChunkSession::open(1, target(1), &encoders, &writers, &format()).unwrap();
        assert_eq!(session.state(), ChunkState::Active);
        assert!(!session.writer_started());

        let summary = session.finish().unwrap();
        assert_eq!(summary.frames, 0);
        assert!(!summary.writer_started);

        let log = encoders.log();
        assert_eq!((log.started, log.stopped, log.released), (1, 1, 1));
        let records = writers.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].released);
        assert!(!records[0].stopped);
    }

    #[test]
    fn test_writer_failure_releases_encoder() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::failing();

        let result = ChunkSession::open(1, target(1), &encoders, &writers, &format());
        assert!(matches!(result, Err(AppError::OutputTarget(_))));

        let log: EncoderLog = encoders.log();
        assert_eq!(log.released, 1);
    }

    #[test]
    fn test_drop_releases_unfinished() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::default();

        let session = ChunkSession::open(1, target(1), &encoders, &writers, &format()).unwrap();
        drop(session);

        assert_eq!(encoders.log().released, 1);
        assert_eq!(encoders.log().stopped, 0);
        assert!(writers.records()[0].released);
    }

    #[test]
    fn test_record_frame_rebases() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::default();
        let mut session = ChunkSession::open(2, target(2), &encoders, &writers, &format()).unwrap();

        assert_eq!(session.record_frame(50_000_000), (1, 0));
        assert_eq!(session.record_frame(60_000_000), (2, 10_000));
    }

    #[test]
    fn test_write_before_format_rejected() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::default();
        let mut session = ChunkSession::open(1, target(1), &encoders, &writers, &format()).unwrap();

        let err = session.write_sample(b"x", &BufferInfo::default()).unwrap_err();
        assert!(matches!(err, AppError::WriterNotStarted { chunk: 1 }));
    }

    #[test]
    fn test_format_changed_twice_rejected() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::default();
        let mut session = ChunkSession::open(4, target(4), &encoders, &writers, &format()).unwrap();

        session.on_format_changed().unwrap();
        assert!(session.writer_started());
        let err = session.on_format_changed().unwrap_err();
        assert!(matches!(err, AppError::FormatChangedTwice { chunk: 4 }));
    }

    #[test]
    fn test_no_input_after_end_of_stream() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::default();
        let mut session = ChunkSession::open(1, target(1), &encoders, &writers, &format()).unwrap();

        assert!(session.signal_end_of_stream().unwrap());
        assert_eq!(session.state(), ChunkState::Draining);
        let frame = VideoFrame::from_vec(vec![1], 0);
        assert!(session.queue_frame(&frame, 0, false).is_err());
    }
}
