//! Error types for clara-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

use crate::audio::pcm::DecodeError;
use crate::narration::segmenter::SegmentError;
use crate::synthesis::SynthesisError;

/// Main error type for clara-ap module
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Text could not be segmented for narration
    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Audio payload decoding errors
    #[error("Audio decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Remote model errors
    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Output is suspended and could not be resumed
    #[error("Audio output unavailable: {0}")]
    OutputUnavailable(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] clara_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using clara-ap Error
pub type Result<T> = std::result::Result<T, Error>;
