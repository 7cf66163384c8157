//! Encoder traits and common types
//!
//! The pipeline talks to the hardware encoder only through [`HardwareEncoder`],
//! a buffer-queue contract modelled on platform codec APIs: raw frames go in
//! through dequeued input buffers, encoded units come out through a polled
//! output queue.

use bytes::{Bytes, BytesMut};
use std::fmt;
use std::time::Duration;

use crate::error::Result;
use crate::video::format::MediaFormat;

/// Per-buffer flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    /// Unit contains a key frame
    pub const KEY_FRAME: BufferFlags = BufferFlags(1);
    /// Unit carries codec configuration data rather than media
    pub const CODEC_CONFIG: BufferFlags = BufferFlags(2);
    /// Last unit of the stream
    pub const END_OF_STREAM: BufferFlags = BufferFlags(4);

    pub fn from_bits(bits: u32) -> Self {
        BufferFlags(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: BufferFlags) {
        self.0 |= other.0;
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.contains(BufferFlags::END_OF_STREAM)
    }

    pub fn is_codec_config(&self) -> bool {
        self.contains(BufferFlags::CODEC_CONFIG)
    }

    pub fn is_key_frame(&self) -> bool {
        self.contains(BufferFlags::KEY_FRAME)
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for BufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.is_key_frame() {
            names.push("KEY");
        }
        if self.is_codec_config() {
            names.push("CONFIG");
        }
        if self.is_end_of_stream() {
            names.push("EOS");
        }
        if names.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Metadata describing one encoded output unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferInfo {
    /// Start of valid data within the output buffer
    pub offset: usize,
    /// Length of valid data
    pub size: usize,
    /// Chunk-relative presentation time in microseconds
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl BufferInfo {
    pub fn set(&mut self, offset: usize, size: usize, presentation_time_us: i64, flags: BufferFlags) {
        self.offset = offset;
        self.size = size;
        self.presentation_time_us = presentation_time_us;
        self.flags = flags;
    }
}

/// Result of asking the encoder for an input buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSlot {
    /// Buffer index ready to be filled
    Ready(usize),
    /// No input buffer free within the timeout
    WouldBlock,
}

/// Result of polling the encoder output queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    /// An encoded unit is ready at this index; metadata was written to the info
    Available(usize),
    /// Nothing ready within the timeout
    TryAgainLater,
    /// Output format is now known (query with `output_format`)
    FormatChanged,
    /// Output buffer set was replaced
    BuffersChanged,
    /// Status code the pipeline does not understand
    Unknown(i32),
}

/// One configure/start/stop/release lifecycle of a hardware encoder
///
/// Implementations are driven from a single worker thread, so `Send` is
/// required but `Sync` is not.
pub trait HardwareEncoder: Send {
    /// Get encoder name
    fn name(&self) -> &str;

    /// Configure the encoder for the given input format
    fn configure(&mut self, format: &MediaFormat) -> Result<()>;

    /// Start accepting input
    fn start(&mut self) -> Result<()>;

    /// Dequeue a free input buffer
    ///
    /// `timeout` bounds how long the call may wait. Implementations may return
    /// [`InputSlot::WouldBlock`] at once, even for `None`; callers drain
    /// pending output and ask again.
    fn dequeue_input_buffer(&mut self, timeout: Option<Duration>) -> Result<InputSlot>;

    /// Writable input buffer for a dequeued index
    fn input_buffer(&mut self, index: usize) -> Option<&mut BytesMut>;

    /// Submit a filled input buffer
    fn queue_input_buffer(
        &mut self,
        index: usize,
        offset: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()>;

    /// Poll the output queue, filling `info` when a unit is available
    fn dequeue_output_buffer(&mut self, timeout: Duration, info: &mut BufferInfo)
        -> Result<OutputStatus>;

    /// Readable output buffer for an index returned by `dequeue_output_buffer`
    fn output_buffer(&self, index: usize) -> Option<Bytes>;

    /// Current output format
    fn output_format(&self) -> Result<MediaFormat>;

    /// Hand an output buffer back to the encoder
    fn release_output_buffer(&mut self, index: usize) -> Result<()>;

    /// Stop encoding
    fn stop(&mut self) -> Result<()>;

    /// Release underlying resources; the session is unusable afterwards
    fn release(&mut self);
}

/// Factory creating one encoder instance per chunk
pub trait EncoderFactory: Send + Sync {
    /// Create an unconfigured encoder
    fn create(&self) -> Result<Box<dyn HardwareEncoder>>;

    /// Get encoder type name
    fn encoder_type(&self) -> &str;
}
