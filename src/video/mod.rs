//! Video types and the collaborators the chunker drives
//!
//! This module provides the frame and format types, the encoder and
//! container writer contracts with their bundled implementations, and output
//! target allocation.

pub mod encoder;
pub mod format;
pub mod frame;
pub mod muxer;
pub mod output;

pub use encoder::{EncoderFactory, HardwareEncoder, PassthroughEncoder, PassthroughEncoderFactory};
pub use format::{ColorFormat, MediaFormat, Resolution};
pub use frame::VideoFrame;
pub use muxer::{ContainerWriter, SampleFileWriter, SampleFileWriterFactory, WriterFactory};
pub use output::{DirectoryAllocator, OutputAllocator, OutputTarget};
