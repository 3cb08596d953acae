//! Error types for datasync
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! "Not found" is deliberately absent: repository lookups report a missing
//! owner or snapshot as an empty result, `None`, or `false`.

use std::io;
use thiserror::Error;

/// Result type alias for datasync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for datasync
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, config loading, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transaction or query failure reported by a storage backend
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration could not be parsed or failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A sweep was requested while another one is still active
    #[error("Optimization sweep already running")]
    SweepAlreadyRunning,

    /// Internal failure (runtime shutdown, task join failure)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a backend error from any displayable source
    pub fn backend(e: impl std::fmt::Display) -> Self {
        Error::Backend(e.to_string())
    }

    /// Build a serialization error from any displayable source
    pub fn serialization(e: impl std::fmt::Display) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
