//! Outcome of analyzing one submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tool_primitives::{ContentHash, Language};

use crate::estimate::ResourceEstimate;
use crate::finding::Finding;

/// Result of static analysis, later enriched by policy evaluation.
///
/// `is_valid` holds exactly when `errors` is empty and no finding is
/// critical. Code that mutates the collections directly must call
/// [`ValidationResult::recompute_validity`] afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Admission verdict.
    pub is_valid: bool,
    /// Language the source was analyzed as.
    pub language: Language,
    /// Content hash of the analyzed source.
    pub content_hash: ContentHash,
    /// Blocking problems (syntax errors, critical policy violations).
    pub errors: Vec<String>,
    /// Non-blocking problems.
    pub warnings: Vec<String>,
    /// Individual findings.
    pub findings: Vec<Finding>,
    /// Structural resource estimate; absent when parsing failed.
    pub estimate: Option<ResourceEstimate>,
    /// When the analysis ran.
    pub analyzed_at: DateTime<Utc>,
}

impl ValidationResult {
    /// Creates an empty, valid result for `source`.
    #[must_use]
    pub fn new(language: Language, source: &str) -> Self {
        Self {
            is_valid: true,
            language,
            content_hash: ContentHash::compute(language, source),
            errors: Vec::new(),
            warnings: Vec::new(),
            findings: Vec::new(),
            estimate: None,
            analyzed_at: Utc::now(),
        }
    }

    /// Records a blocking error and marks the result invalid.
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.is_valid = false;
    }

    /// Records a non-blocking warning.
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Records a finding, invalidating the result when it is critical.
    pub fn push_finding(&mut self, finding: Finding) {
        if finding.is_critical() {
            self.is_valid = false;
        }
        self.findings.push(finding);
    }

    /// Returns `true` if any finding is critical.
    #[must_use]
    pub fn has_critical_findings(&self) -> bool {
        self.findings.iter().any(Finding::is_critical)
    }

    /// Re-derives `is_valid` from `errors` and `findings`.
    pub fn recompute_validity(&mut self) {
        self.is_valid = self.errors.is_empty() && !self.has_critical_findings();
    }

    /// Errors followed by warnings, for display.
    #[must_use]
    pub fn all_issues(&self) -> Vec<&str> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::FindingKind;
    use tool_primitives::Severity;

    #[test]
    fn critical_finding_invalidates() {
        let mut result = ValidationResult::new(Language::Python, "x = 1");
        assert!(result.is_valid);
        result.push_finding(Finding::new(
            Severity::Medium,
            FindingKind::DangerousPattern,
            "meh",
        ));
        assert!(result.is_valid);
        result.push_finding(Finding::prohibited_import("os"));
        assert!(!result.is_valid);
        assert!(result.has_critical_findings());
    }

    #[test]
    fn recompute_restores_validity() {
        let mut result = ValidationResult::new(Language::JavaScript, "1");
        result.push_error("boom");
        assert!(!result.is_valid);
        result.errors.clear();
        result.recompute_validity();
        assert!(result.is_valid);
    }
}
