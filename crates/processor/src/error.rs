//! Error taxonomy for the processor pipeline.
//!
//! One `thiserror` enum per concern (decode, window, sink, checkpoint,
//! config), each composed into the top-level [`PipelineError`] via
//! `#[from]`, plus a `Result` alias per concern.

use thiserror::Error;

/// Errors raised while decoding a raw record into a `PostEvent`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("type mismatch for field {field}: {reason}")]
    TypeMismatch {
        field: &'static str,
        reason: String,
    },
}

/// Errors raised by the windowed aggregation stage.
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("window error: {reason}")]
    Invalid { reason: String },
}

/// Errors raised while publishing a record to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to serialize record for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("sink write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("sink retries exhausted after {attempts} attempt(s): {reason}")]
    RetriesExhausted { attempts: u32, reason: String },
}

/// Errors raised while reading or writing partition checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to write checkpoint for partition {partition}: {reason}")]
    WriteFailed { partition: u32, reason: String },

    #[error("failed to read checkpoint at {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("corrupted checkpoint at {path}: {reason}")]
    Corrupted { path: String, reason: String },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Top-level pipeline error composing the per-concern errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("worker for partition {partition} failed: {reason}")]
    WorkerFailed { partition: u32, reason: String },
}

impl From<bincode::Error> for CheckpointError {
    fn from(e: bincode::Error) -> Self {
        CheckpointError::Corrupted {
            path: String::new(),
            reason: e.to_string(),
        }
    }
}

/// Result aliased to the top-level [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result aliased to [`DecodeError`].
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Result aliased to [`SinkError`].
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Result aliased to [`CheckpointError`].
pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;
