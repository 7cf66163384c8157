//! Container writer abstraction
//!
//! The pipeline hands encoded units to a [`ContainerWriter`] bound to the
//! chunk's output file. [`SampleFileWriter`] is the bundled implementation.

pub mod sample_file;
pub mod traits;

pub use sample_file::{read_sample_file, Sample, SampleFile, SampleFileWriter, SampleFileWriterFactory};
pub use traits::{ContainerWriter, WriterFactory};
