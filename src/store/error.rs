//! Error types for object store operations

use std::io;
use thiserror::Error;

/// Result type alias for object store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by an [`ObjectStore`](super::ObjectStore) implementation
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Object (or the requested generation of it) does not exist
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Bucket does not exist or is not accessible
    #[error("Bucket not found or not accessible: {0}")]
    BucketNotFound(String),

    /// Access denied by the store
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Store-side error with a service error code
    #[error("Storage service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Network failure talking to the store
    #[error("Network error: {0}")]
    Network(String),

    /// I/O error while producing or consuming a request body
    #[error("I/O error: {0}")]
    Io(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Check if the error is transient (a later identical request may succeed)
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) | StoreError::Io(_) => true,
            StoreError::Service { code, .. } => is_transient_code(code),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// HTTP-ish status codes a JSON API store reports for transient failures
fn is_transient_code(code: &str) -> bool {
    matches!(code, "408" | "429" | "500" | "502" | "503" | "504")
}
