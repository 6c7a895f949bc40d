//! Policy error types.

use thiserror::Error;

/// Errors raised while building or loading a security policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy failed structural validation.
    #[error("invalid security policy: {reason}")]
    InvalidPolicy {
        /// Which check failed.
        reason: String,
    },
    /// Policy document could not be (de)serialized.
    #[error("policy serialization failed: {source}")]
    Serialization {
        /// Underlying serde error.
        #[from]
        source: serde_json::Error,
    },
}

impl PolicyError {
    /// Convenience constructor for [`PolicyError::InvalidPolicy`].
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidPolicy {
            reason: reason.into(),
        }
    }
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
