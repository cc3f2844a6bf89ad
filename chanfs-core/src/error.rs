// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for chanfs

use thiserror::Error;

/// Result type alias
pub type ChanfsResult<T> = Result<T, ChanfsError>;

/// Main error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChanfsError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Name already exists: {0}")]
    NameExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Transfer of {what} failed after {attempts} attempt(s): {reason}")]
    TransferFailed {
        what: String,
        attempts: u32,
        reason: String,
    },

    #[error("Snapshot persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Timeout")]
    Timeout,

    #[error("Backend error ({backend}): {message}")]
    Backend { backend: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChanfsError {
    /// Transient backend failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChanfsError::Network(_) | ChanfsError::RateLimited { .. } | ChanfsError::Timeout
        )
    }

    /// Failures caused by the request itself rather than the backend.
    /// These are never retried.
    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            ChanfsError::InvalidPath(_)
                | ChanfsError::NotFound(_)
                | ChanfsError::NameExists(_)
                | ChanfsError::DirectoryNotEmpty(_)
                | ChanfsError::InvalidOperation(_)
        )
    }

    /// Server-suggested delay for rate-limit errors.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ChanfsError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChanfsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ChanfsError::NotFound(err.to_string()),
            std::io::ErrorKind::TimedOut => ChanfsError::Timeout,
            _ => ChanfsError::Io(err.to_string()),
        }
    }
}
