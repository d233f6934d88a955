//! Error types shared across the host/module boundary
//!
//! Every failure maps onto one of the [`ErrorCode`] values that modules and
//! the host agree on. The [`Error`] enum carries a message alongside the code
//! so that logs stay readable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for tonearm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result codes understood on both sides of the module boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Success,
    AlreadyInitialized,
    NotInitialized,
    InvalidParameter,
    InvalidState,
    FileNotFound,
    NotSupported,
    Error,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::Success => "success",
            ErrorCode::AlreadyInitialized => "already initialized",
            ErrorCode::NotInitialized => "not initialized",
            ErrorCode::InvalidParameter => "invalid parameter",
            ErrorCode::InvalidState => "invalid state",
            ErrorCode::FileNotFound => "file not found",
            ErrorCode::NotSupported => "not supported",
            ErrorCode::Error => "error",
        };
        f.write_str(name)
    }
}

/// Main error type for tonearm crates and plugin modules
#[derive(Error, Debug)]
pub enum Error {
    /// Component (or identity) already initialized / already registered
    #[error("Already initialized: {0}")]
    AlreadyInitialized(String),

    /// Component used before initialization
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Caller passed an unknown id or out-of-range argument
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File or directory missing
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Format, version or feature not supported
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Boundary code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::AlreadyInitialized(_) => ErrorCode::AlreadyInitialized,
            Error::NotInitialized(_) => ErrorCode::NotInitialized,
            Error::InvalidParameter(_) | Error::Config(_) => ErrorCode::InvalidParameter,
            Error::InvalidState(_) => ErrorCode::InvalidState,
            Error::FileNotFound(_) => ErrorCode::FileNotFound,
            Error::NotSupported(_) => ErrorCode::NotSupported,
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
            Error::Io(_) | Error::Internal(_) => ErrorCode::Error,
        }
    }
}

/// Collapse a result into its boundary code
pub fn code_of<T>(result: &Result<T>) -> ErrorCode {
    match result {
        Ok(_) => ErrorCode::Success,
        Err(e) => e.code(),
    }
}
