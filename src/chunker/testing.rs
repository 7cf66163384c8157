//! Fault-injecting encoder and recording writer for pipeline tests

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::video::encoder::{
    BufferFlags, BufferInfo, EncoderFactory, HardwareEncoder, InputSlot, OutputStatus,
    PassthroughConfig, PassthroughEncoder,
};
use crate::video::format::MediaFormat;
use crate::video::muxer::{ContainerWriter, WriterFactory};
use crate::video::output::OutputTarget;

/// Misbehaviour injected into a [`FaultyEncoder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    None,
    /// Report the output format change a second time
    FormatChangedTwice,
    /// Return no buffer for an available output index
    NullOutputBuffer,
    /// Swallow the format change so data arrives before the writer starts
    DataBeforeFormat,
    /// Report this status code once before the first real poll result
    UnknownStatus(i32),
    /// Flag the first data unit as end of stream
    SpuriousEndOfStream,
    /// Report no free input buffer this many times before every grant
    StarvedInputs(u32),
}

/// Lifecycle calls observed across every encoder a factory created
#[derive(Debug, Clone, Default)]
pub(crate) struct EncoderLog {
    pub created: u32,
    pub started: u32,
    pub stopped: u32,
    pub released: u32,
    pub eos_inputs: u32,
    pub outstanding_outputs: u32,
    /// Input dequeues answered with `WouldBlock`
    pub input_stalls: u32,
}

/// Passthrough encoder wrapped with fault injection and call logging
pub(crate) struct FaultyEncoder {
    inner: PassthroughEncoder,
    fault: Fault,
    log: Arc<Mutex<EncoderLog>>,
    repeat_format_change: bool,
    unknown_reported: bool,
    spurious_sent: bool,
    stalls_left: u32,
}

impl HardwareEncoder for FaultyEncoder {
    fn name(&self) -> &str {
        "faulty"
    }

    fn configure(&mut self, format: &MediaFormat) -> Result<()> {
        self.inner.configure(format)
    }

    fn start(&mut self) -> Result<()> {
        self.inner.start()?;
        self.log.lock().started += 1;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, timeout: Option<Duration>) -> Result<InputSlot> {
        if let Fault::StarvedInputs(stalls) = self.fault {
            if self.stalls_left > 0 {
                self.stalls_left -= 1;
                self.log.lock().input_stalls += 1;
                return Ok(InputSlot::WouldBlock);
            }
            self.stalls_left = stalls;
        }
        self.inner.dequeue_input_buffer(timeout)
    }

    fn input_buffer(&mut self, index: usize) -> Option<&mut BytesMut> {
        self.inner.input_buffer(index)
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        offset: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        if flags.is_end_of_stream() {
            self.log.lock().eos_inputs += 1;
        }
        self.inner
            .queue_input_buffer(index, offset, size, presentation_time_us, flags)
    }

    fn dequeue_output_buffer(
        &mut self,
        timeout: Duration,
        info: &mut BufferInfo,
    ) -> Result<OutputStatus> {
        if let Fault::UnknownStatus(code) = self.fault {
            if !self.unknown_reported {
                self.unknown_reported = true;
                return Ok(OutputStatus::Unknown(code));
            }
        }
        if self.repeat_format_change {
            self.repeat_format_change = false;
            return Ok(OutputStatus::FormatChanged);
        }

        let mut status = self.inner.dequeue_output_buffer(timeout, info)?;
        if status == OutputStatus::FormatChanged {
            match self.fault {
                Fault::FormatChangedTwice => self.repeat_format_change = true,
                Fault::DataBeforeFormat => {
                    status = self.inner.dequeue_output_buffer(timeout, info)?;
                }
                _ => {}
            }
        }
        if let OutputStatus::Available(_) = status {
            if self.fault == Fault::SpuriousEndOfStream
                && !self.spurious_sent
                && info.size > 0
                && !info.flags.is_codec_config()
            {
                self.spurious_sent = true;
                info.flags.insert(BufferFlags::END_OF_STREAM);
            }
            self.log.lock().outstanding_outputs += 1;
        }
        Ok(status)
    }

    fn output_buffer(&self, index: usize) -> Option<Bytes> {
        if self.fault == Fault::NullOutputBuffer {
            return None;
        }
        self.inner.output_buffer(index)
    }

    fn output_format(&self) -> Result<MediaFormat> {
        self.inner.output_format()
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        self.inner.release_output_buffer(index)?;
        let mut log = self.log.lock();
        log.outstanding_outputs = log.outstanding_outputs.saturating_sub(1);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()?;
        self.log.lock().stopped += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.inner.release();
        self.log.lock().released += 1;
    }
}

#[derive(Clone)]
pub(crate) struct FaultyEncoderFactory {
    fault: Fault,
    passthrough: PassthroughConfig,
    log: Arc<Mutex<EncoderLog>>,
}

impl FaultyEncoderFactory {
    pub fn new(fault: Fault) -> Self {
        Self {
            fault,
            passthrough: PassthroughConfig::default(),
            log: Arc::new(Mutex::new(EncoderLog::default())),
        }
    }

    pub fn with_passthrough(passthrough: PassthroughConfig) -> Self {
        Self {
            passthrough,
            ..Self::new(Fault::None)
        }
    }

    pub fn log(&self) -> EncoderLog {
        self.log.lock().clone()
    }
}

impl Default for FaultyEncoderFactory {
    fn default() -> Self {
        Self::new(Fault::None)
    }
}

impl EncoderFactory for FaultyEncoderFactory {
    fn create(&self) -> Result<Box<dyn HardwareEncoder>> {
        self.log.lock().created += 1;
        Ok(Box::new(FaultyEncoder {
            inner: PassthroughEncoder::new(self.passthrough.clone()),
            fault: self.fault,
            log: self.log.clone(),
            repeat_format_change: false,
            unknown_reported: false,
            spurious_sent: false,
            stalls_left: match self.fault {
                Fault::StarvedInputs(stalls) => stalls,
                _ => 0,
            },
        }))
    }

    fn encoder_type(&self) -> &str {
        "faulty"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedSample {
    pub pts_us: i64,
    pub flags: BufferFlags,
    pub data: Vec<u8>,
}

/// Everything one writer saw
#[derive(Debug, Clone, Default)]
pub(crate) struct WriterRecord {
    pub chunk_index: u32,
    pub path: PathBuf,
    pub format: Option<MediaFormat>,
    pub started: bool,
    pub stopped: bool,
    pub released: bool,
    pub samples: Vec<RecordedSample>,
}

/// Writer factory that keeps every writer's calls in memory
#[derive(Clone, Default)]
pub(crate) struct RecordingWriterFactory {
    records: Arc<Mutex<Vec<WriterRecord>>>,
    fail_open: bool,
}

impl RecordingWriterFactory {
    /// Factory whose targets can never be opened
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<WriterRecord> {
        self.records.lock().clone()
    }
}

impl WriterFactory for RecordingWriterFactory {
    fn open(&self, target: &OutputTarget) -> Result<Box<dyn ContainerWriter>> {
        if self.fail_open {
            return Err(AppError::OutputTarget(format!(
                "cannot open {}",
                target.path.display()
            )));
        }
        let mut records = self.records.lock();
        records.push(WriterRecord {
            chunk_index: target.chunk_index,
            path: target.path.clone(),
            ..WriterRecord::default()
        });
        Ok(Box::new(RecordingWriter {
            slot: records.len() - 1,
            records: self.records.clone(),
        }))
    }
}

struct RecordingWriter {
    slot: usize,
    records: Arc<Mutex<Vec<WriterRecord>>>,
}

impl RecordingWriter {
    fn with_record<T>(&self, f: impl FnOnce(&mut WriterRecord) -> Result<T>) -> Result<T> {
        let mut records = self.records.lock();
        f(&mut records[self.slot])
    }
}

impl ContainerWriter for RecordingWriter {
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize> {
        self.with_record(|record| {
            if record.format.is_some() {
                return Err(AppError::Writer("track already added".to_string()));
            }
            record.format = Some(format.clone());
            Ok(0)
        })
    }

    fn start(&mut self) -> Result<()> {
        self.with_record(|record| {
            if record.format.is_none() || record.started {
                return Err(AppError::Writer("bad start".to_string()));
            }
            record.started = true;
            Ok(())
        })
    }

    fn write_sample_data(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<()> {
        self.with_record(|record| {
            if !record.started || record.stopped || track != 0 {
                return Err(AppError::Writer("write outside started track".to_string()));
            }
            if info.size != data.len() {
                return Err(AppError::Writer("size mismatch".to_string()));
            }
            record.samples.push(RecordedSample {
                pts_us: info.presentation_time_us,
                flags: info.flags,
                data: data.to_vec(),
            });
            Ok(())
        })
    }

    fn stop(&mut self) -> Result<()> {
        self.with_record(|record| {
            if !record.started {
                return Err(AppError::Writer("stop before start".to_string()));
            }
            record.stopped = true;
            Ok(())
        })
    }

    fn release(&mut self) {
        let _ = self.with_record(|record| {
            record.released = true;
            Ok(())
        });
    }
}
