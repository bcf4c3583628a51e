/*!
 * Error types for gcs-resource
 */

use std::io;
use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_TRANSIENT: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

/// Broad class of an [`Error`], used by callers to decide how to surface it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Detected before any store call; never retryable
    Configuration,
    /// The bucket or listing does not satisfy the request
    Precondition,
    /// Store or local I/O failure, propagated unchanged
    Transport,
}

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or missing configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Both pattern and versioned-file modes were requested
    #[error("please specify either regexp or versioned_file, not both")]
    ConflictingModes,

    /// The naming pattern has no capturing group to extract a version from
    #[error("regexp '{pattern}' must contain a capturing group for the version")]
    PatternWithoutGroup { pattern: String },

    /// The naming pattern does not compile
    #[error("invalid regexp '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A generation override could not be parsed
    #[error("invalid generation: {0}")]
    InvalidGeneration(String),

    /// Generation semantics were used on a bucket without versioning
    #[error("bucket is not versioned: {bucket}")]
    NotVersioned { bucket: String },

    /// No object key in the bucket matched the naming pattern
    #[error("no extractions could be found for '{pattern}' - is your regexp correct?")]
    NoCandidates { pattern: String },

    /// Object store collaborator failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Local file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A chunk upload task panicked or was aborted
    #[error("upload worker for part {index} failed: {message}")]
    Join { index: usize, message: String },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfig(_)
            | Error::ConflictingModes
            | Error::PatternWithoutGroup { .. }
            | Error::InvalidPattern { .. }
            | Error::InvalidGeneration(_) => ErrorCategory::Configuration,
            Error::NotVersioned { .. } | Error::NoCandidates { .. } => ErrorCategory::Precondition,
            Error::Store(_) | Error::Io(_) | Error::Join { .. } => ErrorCategory::Transport,
        }
    }

    /// Fatal errors cannot succeed on a plain re-run of the same request
    pub fn is_fatal(&self) -> bool {
        !matches!(self.category(), ErrorCategory::Transport)
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            EXIT_FATAL
        } else {
            EXIT_TRANSIENT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(Error::ConflictingModes.category(), ErrorCategory::Configuration);
        assert_eq!(
            Error::PatternWithoutGroup {
                pattern: "file.tgz".to_string()
            }
            .category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            Error::NotVersioned {
                bucket: "b".to_string()
            }
            .category(),
            ErrorCategory::Precondition
        );
        assert_eq!(
            Error::Store(StoreError::Network("reset".to_string())).category(),
            ErrorCategory::Transport
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::ConflictingModes.exit_code(), EXIT_FATAL);
        assert_eq!(
            Error::NoCandidates {
                pattern: "x-(.*)".to_string()
            }
            .exit_code(),
            EXIT_FATAL
        );
        let io_err = Error::from(io::Error::other("disk"));
        assert_eq!(io_err.exit_code(), EXIT_TRANSIENT);
        assert!(!io_err.is_fatal());
    }

    #[test]
    fn test_not_versioned_message() {
        let err = Error::NotVersioned {
            bucket: "artifacts".to_string(),
        };
        assert!(err.to_string().contains("bucket is not versioned"));
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: Error = StoreError::NotFound {
            bucket: "b".to_string(),
            key: "k".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Object not found: b/k");
    }
}
