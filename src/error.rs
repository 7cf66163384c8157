use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Encoder output format changed twice in chunk {chunk}")]
    FormatChangedTwice { chunk: u32 },

    #[error("Encoder output buffer {index} was null")]
    MissingOutputBuffer { index: usize },

    #[error("Writer for chunk {chunk} received data before it was started")]
    WriterNotStarted { chunk: u32 },

    #[error("Output target error: {0}")]
    OutputTarget(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Writer error: {0}")]
    Writer(String),

    #[error("End of stream not observed for chunk {chunk} after {waited_ms} ms")]
    DrainTimeout { chunk: u32, waited_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pipeline failed: {0}")]
    PipelineFailed(String),

    #[error("Encoder worker thread panicked")]
    WorkerPanicked,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
