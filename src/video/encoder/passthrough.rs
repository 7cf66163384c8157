//! Software stand-in for a hardware encoder
//!
//! Emits every input frame unchanged as one output unit while honoring the
//! full [`HardwareEncoder`] buffer contract: a bounded input pool, a single
//! output-format-changed event ahead of the first unit, a codec-config unit,
//! periodic key frames and an end-of-stream unit. Useful on hosts without an
//! encoder and for exercising the chunking pipeline end to end.

use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, trace};

use super::traits::{
    BufferFlags, BufferInfo, EncoderFactory, HardwareEncoder, InputSlot, OutputStatus,
};
use crate::error::{AppError, Result};
use crate::video::format::MediaFormat;

/// Passthrough encoder configuration
#[derive(Debug, Clone)]
pub struct PassthroughConfig {
    /// Number of input buffers in the pool
    pub input_buffers: usize,
    /// Frames held back before output becomes visible, modelling encoder delay
    pub latency_frames: usize,
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        Self {
            input_buffers: 4,
            latency_frames: 0,
        }
    }
}

struct OutputUnit {
    data: Bytes,
    info: BufferInfo,
}

/// Passthrough "encoder"
pub struct PassthroughEncoder {
    config: PassthroughConfig,
    format: Option<MediaFormat>,
    started: bool,
    released: bool,
    inputs: Vec<BytesMut>,
    free_inputs: VecDeque<usize>,
    /// Encoded units still inside the simulated encoder delay
    in_flight: VecDeque<OutputUnit>,
    /// Units visible to `dequeue_output_buffer`
    ready: VecDeque<OutputUnit>,
    /// Dequeued units not yet released by the caller
    held: HashMap<usize, Bytes>,
    next_output_index: usize,
    format_reported: bool,
    config_emitted: bool,
    eos_queued: bool,
    frames_in: u64,
}

impl PassthroughEncoder {
    pub fn new(config: PassthroughConfig) -> Self {
        Self {
            config,
            format: None,
            started: false,
            released: false,
            inputs: Vec::new(),
            free_inputs: VecDeque::new(),
            in_flight: VecDeque::new(),
            ready: VecDeque::new(),
            held: HashMap::new(),
            next_output_index: 0,
            format_reported: false,
            config_emitted: false,
            eos_queued: false,
            frames_in: 0,
        }
    }

    /// Number of frames accepted so far
    pub fn frames_in(&self) -> u64 {
        self.frames_in
    }

    fn ensure_running(&self) -> Result<()> {
        if self.released {
            return Err(AppError::Encoder("passthrough encoder already released".to_string()));
        }
        if !self.started {
            return Err(AppError::Encoder("passthrough encoder not started".to_string()));
        }
        Ok(())
    }

    /// Synthetic parameter set derived from the configured format
    fn codec_config(format: &MediaFormat) -> Bytes {
        let mut csd = BytesMut::with_capacity(13);
        csd.extend_from_slice(&[0, 0, 0, 1, 0x67]);
        csd.extend_from_slice(&format.resolution.width.to_be_bytes());
        csd.extend_from_slice(&format.resolution.height.to_be_bytes());
        csd.freeze()
    }

    fn push_encoded(&mut self, unit: OutputUnit, flush: bool) {
        self.in_flight.push_back(unit);
        while self.in_flight.len() > self.config.latency_frames || (flush && !self.in_flight.is_empty()) {
            if let Some(unit) = self.in_flight.pop_front() {
                self.ready.push_back(unit);
            }
        }
    }
}

impl Default for PassthroughEncoder {
    fn default() -> Self {
        Self::new(PassthroughConfig::default())
    }
}

impl HardwareEncoder for PassthroughEncoder {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn configure(&mut self, format: &MediaFormat) -> Result<()> {
        if self.started {
            return Err(AppError::Encoder("cannot configure a started encoder".to_string()));
        }
        if self.config.input_buffers == 0 {
            return Err(AppError::Encoder("input buffer pool must not be empty".to_string()));
        }
        let capacity = format.color_format.frame_size(format.resolution).unwrap_or(0);
        self.inputs = (0..self.config.input_buffers)
            .map(|_| BytesMut::with_capacity(capacity))
            .collect();
        self.free_inputs = (0..self.config.input_buffers).collect();
        self.format = Some(format.clone());
        debug!("Passthrough encoder configured: {}", format);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.format.is_none() {
            return Err(AppError::Encoder("encoder started before configure".to_string()));
        }
        self.started = true;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Option<Duration>) -> Result<InputSlot> {
        self.ensure_running()?;
        Ok(match self.free_inputs.pop_front() {
            Some(index) => InputSlot::Ready(index),
            None => InputSlot::WouldBlock,
        })
    }

    fn input_buffer(&mut self, index: usize) -> Option<&mut BytesMut> {
        self.inputs.get_mut(index)
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        offset: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        self.ensure_running()?;
        if self.eos_queued {
            return Err(AppError::Encoder("input queued after end of stream".to_string()));
        }
        let input = self
            .inputs
            .get_mut(index)
            .ok_or_else(|| AppError::Encoder(format!("invalid input buffer index {}", index)))?;
        if offset + size > input.len() {
            return Err(AppError::Encoder(format!(
                "input range {}..{} exceeds buffer of {} bytes",
                offset,
                offset + size,
                input.len()
            )));
        }
        let data = Bytes::copy_from_slice(&input[offset..offset + size]);
        input.clear();
        self.free_inputs.push_back(index);

        let eos = flags.is_end_of_stream();
        if size > 0 {
            if !self.config_emitted {
                let csd = match self.format.as_ref() {
                    Some(format) => Self::codec_config(format),
                    None => Bytes::new(),
                };
                let mut info = BufferInfo::default();
                info.set(0, csd.len(), 0, BufferFlags::CODEC_CONFIG);
                self.ready.push_back(OutputUnit { data: csd, info });
                self.config_emitted = true;
            }

            let gop = self
                .format
                .as_ref()
                .map(|f| f.keyframe_interval_frames())
                .unwrap_or(1);
            let mut out_flags = BufferFlags::NONE;
            if self.frames_in % gop == 0 {
                out_flags.insert(BufferFlags::KEY_FRAME);
            }
            if eos {
                out_flags.insert(BufferFlags::END_OF_STREAM);
            }
            self.frames_in += 1;

            let mut info = BufferInfo::default();
            info.set(0, data.len(), presentation_time_us, out_flags);
            self.push_encoded(OutputUnit { data, info }, eos);
        } else if eos {
            let mut info = BufferInfo::default();
            info.set(0, 0, presentation_time_us, BufferFlags::END_OF_STREAM);
            self.push_encoded(OutputUnit { data: Bytes::new(), info }, true);
        }

        if eos {
            self.eos_queued = true;
        }
        trace!("Passthrough queued {} bytes pts={} flags={}", size, presentation_time_us, flags);
        Ok(())
    }

    fn dequeue_output_buffer(
        &mut self,
        _timeout: Duration,
        info: &mut BufferInfo,
    ) -> Result<OutputStatus> {
        self.ensure_running()?;
        let Some(front) = self.ready.front() else {
            return Ok(OutputStatus::TryAgainLater);
        };
        if !self.format_reported && front.info.size > 0 {
            self.format_reported = true;
            return Ok(OutputStatus::FormatChanged);
        }
        let Some(unit) = self.ready.pop_front() else {
            return Ok(OutputStatus::TryAgainLater);
        };
        let index = self.next_output_index;
        self.next_output_index += 1;
        *info = unit.info;
        self.held.insert(index, unit.data);
        Ok(OutputStatus::Available(index))
    }

    fn output_buffer(&self, index: usize) -> Option<Bytes> {
        self.held.get(&index).cloned()
    }

    fn output_format(&self) -> Result<MediaFormat> {
        let format = self
            .format
            .as_ref()
            .ok_or_else(|| AppError::Encoder("encoder not configured".to_string()))?;
        Ok(format.clone().with_csd(Self::codec_config(format)))
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        self.held
            .remove(&index)
            .map(|_| ())
            .ok_or_else(|| AppError::Encoder(format!("output buffer {} not dequeued", index)))
    }

    fn stop(&mut self) -> Result<()> {
        if self.released {
            return Err(AppError::Encoder("passthrough encoder already released".to_string()));
        }
        self.started = false;
        Ok(())
    }

    fn release(&mut self) {
        self.started = false;
        self.released = true;
        self.inputs.clear();
        self.free_inputs.clear();
        self.in_flight.clear();
        self.ready.clear();
        self.held.clear();
    }
}

/// Factory producing passthrough encoders
#[derive(Debug, Clone, Default)]
pub struct PassthroughEncoderFactory {
    config: PassthroughConfig,
}

impl PassthroughEncoderFactory {
    pub fn new(config: PassthroughConfig) -> Self {
        Self { config }
    }
}

impl EncoderFactory for PassthroughEncoderFactory {
    fn create(&self) -> Result<Box<dyn HardwareEncoder>> {
        Ok(Box::new(PassthroughEncoder::new(self.config.clone())))
    }

    fn encoder_type(&self) -> &str {
        "passthrough"
    }
}
