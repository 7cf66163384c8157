//! Chunked encoder - record a live frame stream as fixed-length files
//!
//! This crate drives a single hardware encoder and container writer pair,
//! rotating them every N frames so a continuous capture becomes a series of
//! independently playable chunk files.

pub mod chunker;
pub mod config;
pub mod error;
pub mod events;
pub mod utils;
pub mod video;

pub use chunker::{ChunkedEncoder, PipelineStatus};
pub use error::{AppError, Result};
