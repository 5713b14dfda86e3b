//! Error types for mediad
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Engine and device failures are converted into these variants
//! at the call site; they never escape a worker task as a panic.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for mediad
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation requested while the named session is already running
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    /// Requested media file does not exist or cannot be opened
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Pipeline engine could not be constructed
    #[error("Engine build error: {0}")]
    EngineBuild(String),

    /// Pipeline engine rejected its configuration (bad container, no track)
    #[error("Engine config error: {0}")]
    EngineConfig(String),

    /// Capture device or frame sink errors
    #[error("Capture error: {0}")]
    Capture(String),

    /// Frame acquisition attempted against a closed capture session
    #[error("Capture session is closed")]
    SessionClosed,

    /// Graceful stop exceeded its bound; degraded to a forced cancel
    #[error("{0} did not shut down within its deadline")]
    ShutdownTimeout(&'static str),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using mediad Error
pub type Result<T> = std::result::Result<T, Error>;
