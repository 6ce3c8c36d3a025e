//! Error types for slowverb-engine
//!
//! Defines the engine error taxonomy using thiserror. Every variant maps to a
//! serializable [`ErrorKind`] so the session snapshot can carry it to the UI.

use slowverb_common::{ErrorKind, LastError};
use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum Error {
    /// Decoder rejected the file, or its MIME type is not accepted
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// File exceeds the tier's byte cap
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    /// No audio subsystem present at all
    #[error("Audio engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A feature was downgraded and playback continues
    #[error("Capability degraded: {0}")]
    CapabilityDegraded(String),

    /// Output blocked until the user interacts
    #[error("Playback needs a user gesture: {0}")]
    NeedsUserGesture(String),

    /// A superseded async result
    #[error("Stale result discarded (generation {stale}, current {current})")]
    RenderStale { stale: u64, current: u64 },

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Audio decoding errors after the format was accepted
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Feature not yet implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// UI-facing classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedFormat(_) | Error::Decode(_) => ErrorKind::UnsupportedFormat,
            Error::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            Error::EngineUnavailable(_) | Error::AudioOutput(_) => ErrorKind::EngineUnavailable,
            Error::CapabilityDegraded(_) => ErrorKind::CapabilityDegraded,
            Error::NeedsUserGesture(_) => ErrorKind::NeedsUserGesture,
            Error::RenderStale { .. } => ErrorKind::RenderStale,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Config(_) | Error::Io(_) | Error::NotImplemented(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Snapshot form of this error
    pub fn to_last_error(&self) -> LastError {
        LastError::new(self.kind(), self.to_string())
    }
}

impl From<slowverb_common::Error> for Error {
    fn from(e: slowverb_common::Error) -> Self {
        match e {
            slowverb_common::Error::Io(io) => Error::Io(io),
            slowverb_common::Error::Config(msg) => Error::Config(msg),
            slowverb_common::Error::InvalidInput(msg) => Error::InvalidState(msg),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Blocking task failed: {}", e))
    }
}

/// Convenience Result type using slowverb-engine Error
pub type Result<T> = std::result::Result<T, Error>;
