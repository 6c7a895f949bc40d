//! Requests, reports and summaries exchanged with the validation service.

use serde::{Deserialize, Serialize};
use tool_analysis::{ResourceEstimate, ValidationResult};
use tool_policy::{DecisionKind, PolicyDecision, PolicyViolation, ViolationSummary};
use tool_primitives::{ContentHash, Language};

/// How a request interacts with the artifact cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Look up first, store on success.
    #[default]
    ReadWrite,
    /// Always analyze, store on success.
    Refresh,
    /// Neither read nor write.
    Bypass,
}

impl CacheMode {
    /// Whether a lookup precedes analysis.
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::ReadWrite)
    }

    /// Whether an accepted result is written back.
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::ReadWrite | Self::Refresh)
    }
}

/// One submission to validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    language: Language,
    source: String,
    dependencies: Vec<String>,
    cache_mode: CacheMode,
}

impl ValidationRequest {
    /// Creates a request using [`CacheMode::ReadWrite`].
    #[must_use]
    pub fn new(language: Language, source: impl Into<String>) -> Self {
        Self {
            language,
            source: source.into(),
            dependencies: Vec::new(),
            cache_mode: CacheMode::default(),
        }
    }

    /// Sets the cache mode.
    #[must_use]
    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    /// Declares runtime dependencies recorded with the cached artifact.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Returns the language.
    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    /// Returns the submitted source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Returns the cache mode.
    #[must_use]
    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    /// Content hash of the submission.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::compute(self.language, &self.source)
    }
}

/// Analysis result, violations and decision for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Analyzer output, verbatim from the cache on hits.
    pub result: ValidationResult,
    /// Violations under the policy in force.
    pub violations: Vec<PolicyViolation>,
    /// Decision derived from `violations`.
    pub decision: PolicyDecision,
    /// Policy the report was evaluated under.
    pub policy_id: String,
    /// Whether `result` came from the cache.
    pub cache_hit: bool,
}

impl ValidationReport {
    /// Builds a report, deriving the decision from `violations`.
    #[must_use]
    pub fn new(
        result: ValidationResult,
        violations: Vec<PolicyViolation>,
        policy_id: impl Into<String>,
        cache_hit: bool,
    ) -> Self {
        let decision = PolicyDecision::from_violations(&violations);
        Self {
            result,
            violations,
            decision,
            policy_id: policy_id.into(),
            cache_hit,
        }
    }

    /// Whether the submission may be admitted: the analysis is valid and the
    /// decision does not deny it. Escalated submissions are admitted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.result.is_valid && !self.decision.is_deny()
    }

    /// Messages of critical violations, in evaluation order.
    #[must_use]
    pub fn critical_messages(&self) -> Vec<String> {
        self.violations
            .iter()
            .filter(|violation| violation.is_critical())
            .map(|violation| violation.message().to_owned())
            .collect()
    }

    /// Returns the content hash of the analyzed source.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        self.result.content_hash
    }
}

/// Counts describing a report, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Whether the analysis was valid.
    pub is_valid: bool,
    /// Submission language.
    pub language: Language,
    /// Content hash of the source.
    pub content_hash: ContentHash,
    /// Number of analyzer errors.
    pub error_count: usize,
    /// Number of analyzer warnings.
    pub warning_count: usize,
    /// Number of analyzer findings.
    pub finding_count: usize,
    /// Number of policy violations.
    pub violation_count: usize,
    /// Whether any finding is critical.
    pub has_critical_issues: bool,
    /// Policy decision for the submission.
    pub decision: DecisionKind,
    /// Violation breakdown by severity and type.
    pub violations: ViolationSummary,
    /// Resource estimate, when analysis got that far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<ResourceEstimate>,
}

impl From<&ValidationReport> for ValidationSummary {
    fn from(report: &ValidationReport) -> Self {
        let result = &report.result;
        Self {
            is_valid: result.is_valid,
            language: result.language,
            content_hash: result.content_hash,
            error_count: result.errors.len(),
            warning_count: result.warnings.len(),
            finding_count: result.findings.len(),
            violation_count: report.violations.len(),
            has_critical_issues: result.has_critical_findings(),
            decision: report.decision.kind(),
            violations: ViolationSummary::from_violations(&report.violations),
            estimate: result.estimate.clone(),
        }
    }
}
