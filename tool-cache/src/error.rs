//! Error types for the artifact cache and its blob stores.

use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by blob stores, the artifact cache and audit logs.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key cannot be used as a blob location.
    #[error("invalid blob key `{key}`: {reason}")]
    InvalidKey {
        /// Offending key.
        key: String,
        /// Why the key was rejected.
        reason: &'static str,
    },
    /// A conditional write found the blob in a different state than required.
    #[error("conditional write on `{key}` failed: {reason}")]
    Conflict {
        /// Key of the contended blob.
        key: String,
        /// Which precondition failed.
        reason: String,
    },
    /// A conditional update kept conflicting after every retry.
    #[error("gave up on `{key}` after {attempts} conflicting attempts")]
    Contended {
        /// Key of the contended blob.
        key: String,
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// Stored data could not be interpreted.
    #[error("corrupt blob `{key}`: {reason}")]
    Corrupt {
        /// Key of the unreadable blob.
        key: String,
        /// Human-readable reason describing the failure.
        reason: String,
    },
    /// Underlying I/O failure while reading or writing blobs.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
    /// Storage backend reported an application error.
    #[error("storage backend error: {reason}")]
    Backend {
        /// Human-readable reason describing the failure.
        reason: String,
    },
}

impl StorageError {
    /// Helper to construct backend errors from string-like values.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    /// Helper to construct conflict errors.
    #[must_use]
    pub fn conflict(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Helper to construct corruption errors.
    #[must_use]
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` when a conditional write lost a race.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
