//! Common error types for Slowverb

use thiserror::Error;

/// Common result type for Slowverb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the engine and its host
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown preset, parameter name, or out-of-domain value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
