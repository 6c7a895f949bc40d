//! Errors surfaced by the validation service.

use thiserror::Error;
use tool_cache::StorageError;
use tool_policy::PolicyViolation;

/// Failures of a validation request.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The submission is invalid or breaches the policy critically.
    #[error("Code validation failed due to security policy violations")]
    Rejected {
        /// Analyzer errors, syntax errors included.
        errors: Vec<String>,
        /// Analyzer warnings.
        warnings: Vec<String>,
        /// Messages of the critical violations.
        critical: Vec<String>,
        /// Every violation, in evaluation order.
        violations: Vec<PolicyViolation>,
    },
    /// The operation needs an artifact cache and none is configured.
    #[error("artifact cache is not configured")]
    CacheDisabled,
    /// Artifact cache failure on an operation where storage is primary.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ValidationError {
    /// Returns `true` for [`ValidationError::Rejected`].
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Violations behind a rejection; empty for other variants.
    #[must_use]
    pub fn violations(&self) -> &[PolicyViolation] {
        match self {
            Self::Rejected { violations, .. } => violations,
            _ => &[],
        }
    }

    /// Critical violation messages behind a rejection; empty for other variants.
    #[must_use]
    pub fn critical_messages(&self) -> &[String] {
        match self {
            Self::Rejected { critical, .. } => critical,
            _ => &[],
        }
    }
}

/// Result type alias for validation operations.
pub type ServiceResult<T> = Result<T, ValidationError>;
