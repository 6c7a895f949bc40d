//! Cached artifacts and their execution metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tool_analysis::{ResourceEstimate, ValidationResult};
use tool_primitives::{ContentHash, Language};

/// Timeout applied to executions when nothing more specific is configured.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Resource hints handed to the execution backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// Estimated peak memory in megabytes.
    pub estimated_memory_mb: u64,
    /// Estimated CPU time in milliseconds.
    pub estimated_cpu_ms: u64,
    /// Wall-clock timeout for one execution.
    pub timeout_seconds: u64,
    /// Whether the tool needs network access.
    #[serde(default)]
    pub requires_network: bool,
    /// Whether the tool needs filesystem access.
    #[serde(default)]
    pub requires_filesystem: bool,
}

impl Default for ExecutionMetadata {
    fn default() -> Self {
        Self {
            estimated_memory_mb: 128,
            estimated_cpu_ms: 1000,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            requires_network: false,
            requires_filesystem: false,
        }
    }
}

impl ExecutionMetadata {
    /// Derives metadata from a resource estimate.
    #[must_use]
    pub fn from_estimate(estimate: &ResourceEstimate) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let estimated_cpu_ms = (estimate.cpu_seconds * 1000.0).round().max(0.0) as u64;
        Self {
            estimated_memory_mb: estimate.memory_mb,
            estimated_cpu_ms,
            ..Self::default()
        }
    }

    /// Derives metadata from a validation result, falling back to defaults
    /// when no estimate was produced.
    #[must_use]
    pub fn for_result(result: &ValidationResult) -> Self {
        result
            .estimate
            .as_ref()
            .map_or_else(Self::default, Self::from_estimate)
    }

    /// Overrides the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// Validated source stored under its content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact {
    /// Content address of the source.
    pub content_hash: ContentHash,
    /// Language the source was validated as.
    pub language: Language,
    /// Source as validated.
    pub validated_code: String,
    /// Source as submitted, when it differs from `validated_code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_code: Option<String>,
    /// Full analysis result, returned verbatim on cache hits.
    pub validation: ValidationResult,
    /// Identifier of the policy the result was admitted under.
    pub policy_id: String,
    /// Declared runtime dependencies.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Resource hints for execution.
    pub execution: ExecutionMetadata,
    /// Best-effort count of cache hits and executions.
    #[serde(default)]
    pub usage_count: u64,
    /// Time the artifact was first stored.
    pub created_at: DateTime<Utc>,
}

impl CachedArtifact {
    /// Bundles a validated submission. Execution metadata is derived from the
    /// result's estimate.
    #[must_use]
    pub fn new(source: &str, validation: ValidationResult, policy_id: impl Into<String>) -> Self {
        let trimmed = source.trim();
        let original_code = (trimmed != source).then(|| source.to_owned());
        Self {
            content_hash: validation.content_hash,
            language: validation.language,
            validated_code: trimmed.to_owned(),
            original_code,
            execution: ExecutionMetadata::for_result(&validation),
            validation,
            policy_id: policy_id.into(),
            dependencies: Vec::new(),
            usage_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Sets the declared dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Replaces the execution metadata.
    #[must_use]
    pub fn with_execution(mut self, execution: ExecutionMetadata) -> Self {
        self.execution = execution;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_follows_estimate() {
        let estimate = ResourceEstimate::from_counts(2, 1, 3);
        let metadata = ExecutionMetadata::from_estimate(&estimate);
        assert_eq!(metadata.estimated_memory_mb, 84);
        assert_eq!(metadata.estimated_cpu_ms, 2100);
        assert_eq!(metadata.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
        assert!(!metadata.requires_network);
    }

    #[test]
    fn metadata_defaults_without_estimate() {
        let result = ValidationResult::new(Language::Python, "x = 1");
        let metadata = ExecutionMetadata::for_result(&result);
        assert_eq!(metadata, ExecutionMetadata::default());
        assert_eq!(metadata.estimated_memory_mb, 128);
        assert_eq!(metadata.estimated_cpu_ms, 1000);
    }

    #[test]
    fn artifact_keeps_original_only_when_trimmed() {
        let result = ValidationResult::new(Language::Python, "x = 1");
        let exact = CachedArtifact::new("x = 1", result.clone(), "default-v1");
        assert!(exact.original_code.is_none());

        let padded = CachedArtifact::new("\n x = 1 \n", result, "default-v1");
        assert_eq!(padded.validated_code, "x = 1");
        assert_eq!(padded.original_code.as_deref(), Some("\n x = 1 \n"));
        assert_eq!(padded.content_hash, exact.content_hash);
    }

    #[test]
    fn serde_roundtrip_preserves_result() {
        let mut result = ValidationResult::new(Language::JavaScript, "let a = 1;");
        result.estimate = Some(ResourceEstimate::from_counts(0, 0, 0));
        let artifact = CachedArtifact::new("let a = 1;", result, "permissive-v1")
            .with_dependencies(vec!["lodash".into()]);
        let json = serde_json::to_string(&artifact).unwrap();
        let back: CachedArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, artifact);
    }
}
