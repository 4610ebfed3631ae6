//! Error types for Ratewarden.

use thiserror::Error;

use crate::crypto::CipherError;
use crate::metrics::MetricsError;

/// Main error type for Ratewarden operations.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Block cipher errors
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Metrics client errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Invalid key extraction pattern
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratewarden operations.
pub type Result<T> = std::result::Result<T, WardenError>;
