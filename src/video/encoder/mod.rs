//! Video encoder abstraction
//!
//! This module provides:
//! - The hardware encoder session contract driven by the chunking pipeline
//! - A passthrough software encoder implementing the same contract

pub mod passthrough;
pub mod traits;

// Core traits and types
pub use traits::{
    BufferFlags, BufferInfo, EncoderFactory, HardwareEncoder, InputSlot, OutputStatus,
};

// Passthrough encoder
pub use passthrough::{PassthroughConfig, PassthroughEncoder, PassthroughEncoderFactory};
