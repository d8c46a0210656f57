//! Error taxonomy for the detection core.
//!
//! Variants are grouped by recovery strategy rather than by origin:
//! `ResourceExhausted` is retryable after backoff, `ModelLoadFailed` means
//! the worker should retry the load (possibly from an alternate directory),
//! `DetectionFailed` poisons a single cycle only, `InputNotFound` is the
//! ordinary "no new segment yet" case that callers treat as a quiet skip,
//! and `UnknownStream` means the caller named a stream the configuration
//! does not know.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    /// A bounded resource (buffer pool slot, large-model budget) is full.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The model file is missing, unreadable, unclassifiable, or the
    /// backend rejected it.
    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    /// A single inference cycle failed; the worker keeps running.
    #[error("detection failed: {0}")]
    DetectionFailed(String),

    /// No new input is available for this stream.
    #[error("no new input available")]
    InputNotFound,

    /// The named stream does not exist in the configuration source.
    #[error("unknown stream: {0}")]
    UnknownStream(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DetectError>;
