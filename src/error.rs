//! Error types for Storehouse.

use thiserror::Error;

/// Common error type for Storehouse.
#[derive(Error, Debug)]
pub enum StorehouseError {
    /// The path escapes the storage root or is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// The target already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The client used up its upload quota for the current window.
    #[error("upload quota exceeded, retry in {retry_after_secs}s")]
    QuotaExceeded {
        /// Seconds until the oldest upload leaves the window.
        retry_after_secs: u64,
    },

    /// The declared content type is on the blocklist.
    #[error("file type not allowed: {0}")]
    ForbiddenType(String),

    /// A single file exceeded the size limit.
    #[error("file too large (max {limit} bytes)")]
    PayloadTooLarge {
        /// Configured maximum size in bytes.
        limit: u64,
    },

    /// A batch carried more files than allowed.
    #[error("too many files (max {limit} per batch)")]
    TooManyFiles {
        /// Configured maximum number of files.
        limit: usize,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation was interrupted before it finished.
    #[error("operation cancelled")]
    Cancelled,
}

impl StorehouseError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            StorehouseError::InvalidPath(_) => "INVALID_PATH",
            StorehouseError::NotFound(_) => "NOT_FOUND",
            StorehouseError::AlreadyExists(_) => "ALREADY_EXISTS",
            StorehouseError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            StorehouseError::ForbiddenType(_) => "FORBIDDEN_TYPE",
            StorehouseError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            StorehouseError::TooManyFiles { .. } => "TOO_MANY_FILES",
            StorehouseError::Io(_) => "IO_FAILURE",
            StorehouseError::Config(_) => "CONFIG_ERROR",
            StorehouseError::Validation(_) => "VALIDATION_ERROR",
            StorehouseError::Cancelled => "CANCELLED",
        }
    }
}

/// Result type alias for Storehouse operations.
pub type Result<T> = std::result::Result<T, StorehouseError>;
