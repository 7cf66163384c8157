//! Container writer traits

use crate::error::Result;
use crate::video::encoder::BufferInfo;
use crate::video::format::MediaFormat;
use crate::video::output::OutputTarget;

/// One multiplexer instance bound to a single chunk's output target
///
/// Call order is fixed: `add_track` once, then `start`, then any number of
/// `write_sample_data`, then `stop` and `release`.
pub trait ContainerWriter: Send {
    /// Add the video track once the encoder has reported its output format
    fn add_track(&mut self, format: &MediaFormat) -> Result<usize>;

    /// Begin multiplexing; only valid after `add_track`
    fn start(&mut self) -> Result<()>;

    /// Write one encoded sample; `data` is exactly the unit's valid bytes
    fn write_sample_data(&mut self, track: usize, data: &[u8], info: &BufferInfo) -> Result<()>;

    /// Finish the container; only valid after `start`
    fn stop(&mut self) -> Result<()>;

    /// Release underlying resources
    fn release(&mut self);
}

/// Opens a container writer for each chunk's output target
pub trait WriterFactory: Send + Sync {
    fn open(&self, target: &OutputTarget) -> Result<Box<dyn ContainerWriter>>;
}
