//! Encoder output drain loop
//!
//! Pulls every ready unit out of the chunk's encoder and forwards it to the
//! chunk's writer. With `end_of_stream` unset the loop returns as soon as the
//! encoder has nothing ready; with it set the loop keeps polling until the
//! end-of-stream unit comes out.

use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::session::{ChunkSession, ChunkState};
use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::video::encoder::{BufferInfo, OutputStatus};
use crate::warn_throttled;

/// Counters from one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub samples: u64,
    pub bytes: u64,
    pub format_changed: bool,
    pub end_of_stream: bool,
}

/// Reusable drain state
pub struct DrainLoop {
    poll_timeout: Duration,
    eos_timeout: Option<Duration>,
    info: BufferInfo,
    throttler: LogThrottler,
}

impl DrainLoop {
    pub fn new(poll_timeout: Duration, eos_timeout: Option<Duration>) -> Self {
        Self {
            poll_timeout,
            eos_timeout,
            info: BufferInfo::default(),
            throttler: LogThrottler::default(),
        }
    }

    /// Drain the session's encoder into its writer
    pub fn drain(&mut self, session: &mut ChunkSession, end_of_stream: bool) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        if session.eos_observed() {
            trace!("Chunk {}: encoder already at end of stream", session.index());
            report.end_of_stream = true;
            return Ok(report);
        }

        let started = Instant::now();
        loop {
            let status = session
                .encoder_mut()
                .dequeue_output_buffer(self.poll_timeout, &mut self.info)?;

            match status {
                OutputStatus::TryAgainLater => {
                    if !end_of_stream {
                        break;
                    }
                    if let Some(limit) = self.eos_timeout {
                        let waited = started.elapsed();
                        if waited >= limit {
                            return Err(AppError::DrainTimeout {
                                chunk: session.index(),
                                waited_ms: waited.as_millis() as u64,
                            });
                        }
                    }
                    trace!("No output available, spinning to await EOS");
                }
                OutputStatus::BuffersChanged => {
                    // Output buffers are looked up per index, nothing to refresh
                    debug!("Chunk {}: encoder output buffers changed", session.index());
                }
                OutputStatus::FormatChanged => {
                    session.on_format_changed()?;
                    report.format_changed = true;
                }
                OutputStatus::Unknown(code) => {
                    warn_throttled!(
                        self.throttler,
                        "unknown_output_status",
                        "Unexpected result from encoder output poll: {}",
                        code
                    );
                }
                OutputStatus::Available(index) => {
                    let info = self.info;
                    let buffer = session
                        .encoder_mut()
                        .output_buffer(index)
                        .ok_or(AppError::MissingOutputBuffer { index })?;

                    let mut size = info.size;
                    if info.flags.is_codec_config() {
                        // Already handed to the writer through the format change
                        trace!("Ignoring codec config unit ({} bytes)", size);
                        size = 0;
                    }

                    if size != 0 {
                        if !session.writer_started() {
                            return Err(AppError::WriterNotStarted {
                                chunk: session.index(),
                            });
                        }
                        let end = info
                            .offset
                            .checked_add(size)
                            .filter(|end| *end <= buffer.len())
                            .ok_or_else(|| {
                                AppError::Encoder(format!(
                                    "output unit {}..+{} exceeds buffer {} of {} bytes",
                                    info.offset,
                                    size,
                                    index,
                                    buffer.len()
                                ))
                            })?;
                        session.write_sample(&buffer[info.offset..end], &info)?;
                        report.samples += 1;
                        report.bytes += size as u64;
                    }

                    session.encoder_mut().release_output_buffer(index)?;

                    if info.flags.is_end_of_stream() {
                        if end_of_stream {
                            debug!("Chunk {}: end of stream reached", session.index());
                        } else {
                            warn!("Chunk {}: reached end of stream unexpectedly", session.index());
                        }
                        // Only the terminal input's EOS ends the chunk's output
                        if session.state() == ChunkState::Draining {
                            session.mark_eos_observed();
                        }
                        report.end_of_stream = true;
                        break;
                    }
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::testing::{Fault, FaultyEncoderFactory, RecordingWriterFactory};
    use crate::video::encoder::PassthroughConfig;
    use crate::video::format::{MediaFormat, Resolution, MIME_AVC};
    use crate::video::frame::VideoFrame;
    use crate::video::output::OutputTarget;

    fn open(encoders: &FaultyEncoderFactory, writers: &RecordingWriterFactory) -> ChunkSession {
        let format = MediaFormat::video(MIME_AVC, Resolution::VGA);
        ChunkSession::open(1, OutputTarget::new(1, "mem://1"), encoders, writers, &format).unwrap()
    }

    fn drain_loop() -> DrainLoop {
        DrainLoop::new(Duration::from_millis(1), Some(Duration::from_millis(200)))
    }

    fn queue(session: &mut ChunkSession, byte: u8, pts: i64, eos: bool) {
        let frame = VideoFrame::from_vec(vec![byte; 8], 0);
        assert!(session.queue_frame(&frame, pts, eos).unwrap());
    }

    #[test]
    fn test_drain_without_output_returns() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::default();
        let mut session = open(&encoders, &writers);

        let report = drain_loop().drain(&mut session, false).unwrap();
        assert_eq!(report, DrainReport::default());
        assert!(!session.writer_started());
    }

    #[test]
    fn test_drain_forwards_samples_and_skips_config() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::default();
        let mut session = open(&encoders, &writers);
        let mut drain = drain_loop();

        queue(&mut session, 1, 0, false);
        queue(&mut session, 2, 33_333, false);
        let report = drain.drain(&mut session, false).unwrap();
        assert!(report.format_changed);
        assert_eq!(report.samples, 2);
        assert_eq!(report.bytes, 16);

        queue(&mut session, 3, 66_666, true);
        let report = drain.drain(&mut session, true).unwrap();
        assert!(report.end_of_stream);
        assert_eq!(report.samples, 1);

        let record = &writers.records()[0];
        assert!(record.format.as_ref().unwrap().csd.len() == 1);
        let pts: Vec<i64> = record.samples.iter().map(|s| s.pts_us).collect();
        assert_eq!(pts, vec![0, 33_333, 66_666]);
        assert!(record.samples.iter().all(|s| !s.flags.is_codec_config()));
        assert!(record.samples[2].flags.is_end_of_stream());
        assert_eq!(encoders.log().outstanding_outputs, 0);
    }

    #[test]
    fn test_drain_waits_for_delayed_eos() {
        let encoders = FaultyEncoderFactory::with_passthrough(PassthroughConfig {
            input_buffers: 2,
            latency_frames: 4,
        });
        let writers = RecordingWriterFactory::default();
        let mut session = open(&encoders, &writers);
        let mut drain = drain_loop();

        queue(&mut session, 1, 0, false);
        queue(&mut session, 2, 10, false);
        assert_eq!(drain.drain(&mut session, false).unwrap().samples, 0);

        queue(&mut session, 3, 20, true);
        let report = drain.drain(&mut session, true).unwrap();
        assert_eq!(report.samples, 3);
        assert!(report.end_of_stream);
    }

    #[test]
    fn test_format_changed_twice_is_fatal() {
        let encoders = FaultyEncoderFactory::new(Fault::FormatChangedTwice);
        let writers = RecordingWriterFactory::default();
        let mut session = open(&encoders, &writers);

        queue(&mut session, 1, 0, false);
        let err = drain_loop().drain(&mut session, false).unwrap_err();
        assert!(matches!(err, AppError::FormatChangedTwice { chunk: 1 }));
        assert!(writers.records()[0].samples.is_empty());
    }

    #[test]
    fn test_missing_output_buffer_is_fatal() {
        let encoders = FaultyEncoderFactory::new(Fault::NullOutputBuffer);
        let writers = RecordingWriterFactory::default();
        let mut session = open(&encoders, &writers);

        queue(&mut session, 1, 0, false);
        let err = drain_loop().drain(&mut session, false).unwrap_err();
        assert!(matches!(err, AppError::MissingOutputBuffer { .. }));
    }

    #[test]
    fn test_data_before_writer_start_is_fatal() {
        let encoders = FaultyEncoderFactory::new(Fault::DataBeforeFormat);
        let writers = RecordingWriterFactory::default();
        let mut session = open(&encoders, &writers);

        queue(&mut session, 1, 0, false);
        let err = drain_loop().drain(&mut session, false).unwrap_err();
        assert!(matches!(err, AppError::WriterNotStarted { chunk: 1 }));
    }

    #[test]
    fn test_unknown_status_ignored() {
        let encoders = FaultyEncoderFactory::new(Fault::UnknownStatus(-1000));
        let writers = RecordingWriterFactory::default();
        let mut session = open(&encoders, &writers);
        let mut drain = drain_loop();

        queue(&mut session, 1, 0, false);
        let report = drain.drain(&mut session, false).unwrap();
        assert_eq!(report.samples, 1);
    }

    #[test]
    fn test_terminal_eos_seen_early_is_kept() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::default();
        let mut session = open(&encoders, &writers);
        let mut drain = drain_loop();

        queue(&mut session, 1, 0, true);
        let report = drain.drain(&mut session, false).unwrap();
        assert!(report.end_of_stream);
        assert!(session.eos_observed());

        // A later end-of-stream drain does not wait for a second EOS
        let report = drain.drain(&mut session, true).unwrap();
        assert!(report.end_of_stream);
        assert_eq!(report.samples, 0);
    }

    #[test]
    fn test_spurious_eos_ends_only_the_current_pass() {
        let encoders = FaultyEncoderFactory::new(Fault::SpuriousEndOfStream);
        let writers = RecordingWriterFactory::default();
        let mut session = open(&encoders, &writers);
        let mut drain = drain_loop();

        queue(&mut session, 1, 0, false);
        let report = drain.drain(&mut session, false).unwrap();
        assert!(report.end_of_stream);
        assert_eq!(report.samples, 1);
        assert!(!session.eos_observed());
        assert_eq!(session.state(), ChunkState::Active);

        queue(&mut session, 2, 10, false);
        let report = drain.drain(&mut session, false).unwrap();
        assert!(!report.end_of_stream);
        assert_eq!(report.samples, 1);

        queue(&mut session, 3, 20, true);
        let report = drain.drain(&mut session, true).unwrap();
        assert!(report.end_of_stream);
        assert_eq!(report.samples, 1);
        assert!(session.eos_observed());

        let data: Vec<u8> = writers.records()[0].samples.iter().map(|s| s.data[0]).collect();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn test_eos_wait_is_bounded() {
        let encoders = FaultyEncoderFactory::default();
        let writers = RecordingWriterFactory::default();
        let mut session = open(&encoders, &writers);
        let mut drain = DrainLoop::new(Duration::from_millis(1), Some(Duration::from_millis(20)));

        // Nothing queued, so the encoder never produces end of stream
        let err = drain.drain(&mut session, true).unwrap_err();
        assert!(matches!(err, AppError::DrainTimeout { chunk: 1, .. }));
    }
}
