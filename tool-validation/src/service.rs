//! Analyzer → evaluator → cache orchestration.

use std::sync::Arc;

use tool_analysis::{CodeAnalyzer, SecurityLinter, ValidationResult};
use tool_cache::{ArtifactCache, AuditEntry, AuditLog, CachedArtifact};
use tool_policy::{PolicyEvaluator, SecurityPolicy};
use tool_primitives::{ContentHash, Language, Outcome};
use tracing::{debug, info, warn};

use crate::error::ValidationError;
use crate::report::{ValidationReport, ValidationRequest, ValidationSummary};

/// Produces the admission decision for submitted source.
///
/// The policy is fixed for the lifetime of the service; build another
/// service to enforce a different one. Cache and audit side effects are
/// best-effort and reported through [`Outcome::Degraded`].
#[derive(Clone)]
pub struct ValidationService {
    analyzer: CodeAnalyzer,
    evaluator: PolicyEvaluator,
    cache: Option<ArtifactCache>,
    audit: Option<Arc<dyn AuditLog>>,
}

impl std::fmt::Debug for ValidationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationService")
            .field("policy", &self.evaluator.policy().id())
            .field("analyzer", &self.analyzer)
            .field("cache", &self.cache.is_some())
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

impl ValidationService {
    /// Creates a service enforcing `policy`, without cache or audit log.
    ///
    /// The analyzer's prohibited-name tables are restricted to the policy's.
    #[must_use]
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self {
            analyzer: CodeAnalyzer::new(policy.analyzer_rules()),
            evaluator: PolicyEvaluator::new(policy),
            cache: None,
            audit: None,
        }
    }

    /// Attaches an artifact cache.
    #[must_use]
    pub fn with_cache(mut self, cache: ArtifactCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attaches an audit log.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Attaches a security linter run after Python analysis.
    #[must_use]
    pub fn with_linter(mut self, linter: Arc<dyn SecurityLinter>) -> Self {
        self.analyzer = self.analyzer.with_linter(linter);
        self
    }

    /// Returns the enforced policy.
    #[must_use]
    pub fn policy(&self) -> &Arc<SecurityPolicy> {
        self.evaluator.policy()
    }

    /// Returns the artifact cache, if configured.
    #[must_use]
    pub fn cache(&self) -> Option<&ArtifactCache> {
        self.cache.as_ref()
    }

    /// Validates a submission, returning the report only when it is admitted.
    ///
    /// Cache read failures count as misses; cache and audit write failures
    /// degrade the outcome.
    pub async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Outcome<ValidationReport, ValidationError> {
        let mut reasons = Vec::new();
        let report = self.evaluate(request, &mut reasons).await;

        if !report.is_accepted() {
            info!(
                content_hash = %report.content_hash(),
                policy = %report.policy_id,
                cache_hit = report.cache_hit,
                violations = report.violations.len(),
                "submission rejected"
            );
            return Outcome::Failed(rejection(&report));
        }
        if report.decision.is_escalate() {
            warn!(
                content_hash = %report.content_hash(),
                policy = %report.policy_id,
                rules = ?report.decision.violated_rules(),
                "submission admitted with high-severity violations"
            );
        }

        if !report.cache_hit && request.cache_mode().writes() {
            self.record_accepted(request, &report, &mut reasons).await;
        }
        Outcome::from_parts(report, reasons)
    }

    /// Validates a submission and returns the report whatever the verdict.
    pub async fn validate_safe(&self, request: &ValidationRequest) -> ValidationReport {
        let mut reasons = Vec::new();
        let report = self.evaluate(request, &mut reasons).await;
        if report.is_accepted() && !report.cache_hit && request.cache_mode().writes() {
            self.record_accepted(request, &report, &mut reasons).await;
        }
        report
    }

    /// Re-admits a previously cached result under the current policy,
    /// without analysis.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Rejected`] when the current policy no
    /// longer admits the result.
    pub fn readmit(&self, result: ValidationResult) -> Result<ValidationReport, ValidationError> {
        let report = self.report(result, true);
        if report.is_accepted() {
            Ok(report)
        } else {
            Err(rejection(&report))
        }
    }

    /// Analyzes and evaluates without touching the cache.
    pub async fn analyze(&self, language: Language, source: &str) -> ValidationReport {
        let result = self.analyzer.analyze(source, language).await;
        self.report(result, false)
    }

    /// Removes the cached artifact for one submission, returning whether it
    /// existed. Without a cache this is a no-op.
    pub async fn invalidate(
        &self,
        language: Language,
        source: &str,
    ) -> Outcome<bool, ValidationError> {
        let Some(cache) = &self.cache else {
            return Outcome::Succeeded(false);
        };
        let hash = ContentHash::compute(language, source);
        let existed = match cache.delete(&hash, language).await {
            Ok(existed) => existed,
            Err(err) => return Outcome::Failed(err.into()),
        };
        debug!(content_hash = %hash, existed, "cache entry invalidated");
        let mut reasons = Vec::new();
        self.audit(AuditEntry::invalidated(hash, language), &mut reasons).await;
        Outcome::from_parts(existed, reasons)
    }

    /// Writes a snapshot of the enforced policy, returning its key.
    pub async fn store_policy(&self) -> Outcome<String, ValidationError> {
        let Some(cache) = &self.cache else {
            return Outcome::Failed(ValidationError::CacheDisabled);
        };
        let policy = self.policy();
        let key = match cache.store_policy(policy).await {
            Ok(key) => key,
            Err(err) => return Outcome::Failed(err.into()),
        };
        let mut reasons = Vec::new();
        self.audit(AuditEntry::policy_stored(policy.id()), &mut reasons).await;
        Outcome::from_parts(key, reasons)
    }

    /// Aggregates counts for a report.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn summary(&self, report: &ValidationReport) -> ValidationSummary {
        ValidationSummary::from(report)
    }

    async fn evaluate(
        &self,
        request: &ValidationRequest,
        reasons: &mut Vec<String>,
    ) -> ValidationReport {
        if let Some(report) = self.lookup(request, reasons).await {
            return report;
        }
        self.analyze(request.language(), request.source()).await
    }

    async fn lookup(
        &self,
        request: &ValidationRequest,
        reasons: &mut Vec<String>,
    ) -> Option<ValidationReport> {
        let cache = self.cache.as_ref()?;
        if !request.cache_mode().reads() {
            return None;
        }
        let hash = request.content_hash();
        let artifact = match cache.retrieve(&hash).await {
            Ok(artifact) => artifact?,
            Err(err) => {
                warn!(content_hash = %hash, error = %err, "cache read failed; analyzing");
                reasons.push(format!("cache read failed: {err}"));
                return None;
            }
        };
        debug!(content_hash = %hash, "cache hit");
        if let Err(err) = cache.increment_usage(&hash).await {
            warn!(content_hash = %hash, error = %err, "usage count not updated");
        }
        Some(self.report(artifact.validation, true))
    }

    fn report(&self, result: ValidationResult, cache_hit: bool) -> ValidationReport {
        let violations = self.evaluator.evaluate(&result);
        ValidationReport::new(result, violations, self.policy().id(), cache_hit)
    }

    async fn record_accepted(
        &self,
        request: &ValidationRequest,
        report: &ValidationReport,
        reasons: &mut Vec<String>,
    ) {
        let result = &report.result;
        if let Some(cache) = &self.cache {
            let artifact = CachedArtifact::new(request.source(), result.clone(), &report.policy_id)
                .with_dependencies(request.dependencies().to_vec());
            if let Err(err) = cache.store(&artifact).await {
                warn!(content_hash = %result.content_hash, error = %err, "cache write failed");
                reasons.push(format!("cache write failed: {err}"));
            }
        }
        let entry = AuditEntry::validated(
            result.content_hash,
            result.language,
            &report.policy_id,
            result.is_valid,
            result.has_critical_findings(),
        );
        self.audit(entry, reasons).await;
    }

    async fn audit(&self, entry: AuditEntry, reasons: &mut Vec<String>) {
        let Some(audit) = &self.audit else {
            return;
        };
        if let Err(err) = audit.record(&entry).await {
            warn!(action = ?entry.action, error = %err, "audit entry not written");
            reasons.push(format!("audit write failed: {err}"));
        }
    }
}

fn rejection(report: &ValidationReport) -> ValidationError {
    ValidationError::Rejected {
        errors: report.result.errors.clone(),
        warnings: report.result.warnings.clone(),
        critical: report.critical_messages(),
        violations: report.violations.clone(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use tool_analysis::EMPTY_SOURCE_ERROR;
    use tool_cache::{
        Blob, BlobMeta, BlobStore, MemoryAuditLog, MemoryBlobStore, PutCondition, StorageError,
        StorageResult,
    };

    use super::*;
    use crate::report::CacheMode;

    fn service(policy: SecurityPolicy) -> (Arc<MemoryBlobStore>, ValidationService) {
        let store = Arc::new(MemoryBlobStore::new());
        let service = ValidationService::new(Arc::new(policy))
            .with_cache(ArtifactCache::new(store.clone()));
        (store, service)
    }

    fn python(source: &str) -> ValidationRequest {
        ValidationRequest::new(Language::Python, source)
    }

    #[tokio::test]
    async fn accepted_submission_is_cached_then_hit() {
        let (_, service) = service(SecurityPolicy::strict());
        let request = python("def add(a, b):\n    return a + b\n");

        let first = service.validate(&request).await;
        assert!(matches!(first, Outcome::Succeeded(_)));
        let first = first.into_result().unwrap();
        assert!(!first.cache_hit);

        let second = service.validate(&request).await.into_result().unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.result, first.result);
        assert_eq!(second.violations, first.violations);

        let cache = service.cache().unwrap();
        let stored = cache.retrieve(&request.content_hash()).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
    }

    #[tokio::test]
    async fn prohibited_import_is_rejected_and_not_cached() {
        let (store, service) = service(SecurityPolicy::strict());
        let outcome = service.validate(&python("import os\nos.listdir('.')\n")).await;
        let err = outcome.into_result().unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(err.critical_messages(), ["Prohibited module import: os"]);
        assert_eq!(err.violations()[0].rule_id(), "IMP001");
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn empty_source_is_rejected_with_error() {
        let (_, service) = service(SecurityPolicy::strict());
        let err = service.validate(&python("   ")).await.into_result().unwrap_err();
        match err {
            ValidationError::Rejected { errors, .. } => assert_eq!(errors, [EMPTY_SOURCE_ERROR]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn recursion_diverges_between_policies() {
        let source = "def f(n): return f(n-1)";
        let (_, strict) = service(SecurityPolicy::strict());
        let (_, permissive) = service(SecurityPolicy::permissive());

        let err = strict.validate(&python(source)).await.into_result().unwrap_err();
        assert!(err.violations().iter().any(|v| v.rule_id() == "RES001"
            && v.message().contains("Recursion")));
        assert!(permissive.validate(&python(source)).await.is_ok());
    }

    #[tokio::test]
    async fn cached_result_is_reevaluated_under_current_policy() {
        let store = Arc::new(MemoryBlobStore::new());
        let cache = ArtifactCache::new(store.clone());
        let request = python("def f(n): return f(n-1)");

        let permissive = ValidationService::new(Arc::new(SecurityPolicy::permissive()))
            .with_cache(cache.clone());
        assert!(permissive.validate(&request).await.is_ok());

        let strict = ValidationService::new(Arc::new(SecurityPolicy::strict())).with_cache(cache);
        let err = strict.validate(&request).await.into_result().unwrap_err();
        assert!(err.is_rejected());
        let report = strict.validate_safe(&request).await;
        assert!(report.cache_hit);
        assert!(report.decision.is_deny());
    }

    #[tokio::test]
    async fn bypass_and_refresh_modes() {
        let (store, service) = service(SecurityPolicy::strict());
        let request = python("x = 1").with_cache_mode(CacheMode::Bypass);
        let report = service.validate(&request).await.into_result().unwrap();
        assert!(!report.cache_hit);
        assert!(store.is_empty().await);

        let request = request.with_cache_mode(CacheMode::Refresh);
        service.validate(&request).await.into_result().unwrap();
        let again = service.validate(&request).await.into_result().unwrap();
        assert!(!again.cache_hit);
        assert!(!store.is_empty().await);
    }

    #[tokio::test]
    async fn validate_safe_returns_rejected_reports() {
        let (_, service) = service(SecurityPolicy::strict());
        let report = service.validate_safe(&python("eval('1')")).await;
        assert!(!report.is_accepted());
        assert!(!report.result.is_valid);
        let summary = service.summary(&report);
        assert_eq!(summary.violations.critical, 1);
    }

    #[tokio::test]
    async fn invalidate_removes_cached_artifact() {
        let audit = Arc::new(MemoryAuditLog::default());
        let (store, service) = service(SecurityPolicy::strict());
        let service = service.with_audit(audit.clone());
        let request = python("y = 2");
        service.validate(&request).await.into_result().unwrap();
        assert!(!store.is_empty().await);

        let removed = service.invalidate(Language::Python, "y = 2").await;
        assert!(removed.into_result().unwrap());
        assert!(store.is_empty().await);
        assert_eq!(audit.len().await, 2);
    }

    #[tokio::test]
    async fn store_policy_requires_cache() {
        let service = ValidationService::new(Arc::new(SecurityPolicy::strict()));
        assert!(matches!(
            service.store_policy().await,
            Outcome::Failed(ValidationError::CacheDisabled)
        ));

        let (store, service) = self::service(SecurityPolicy::strict());
        let key = service.store_policy().await.into_result().unwrap();
        assert!(store.exists(&key).await.unwrap());
    }

    /// Store whose every operation fails.
    struct Broken;

    #[async_trait]
    impl BlobStore for Broken {
        async fn put(&self, _: &str, _: Bytes, _: PutCondition) -> StorageResult<u64> {
            Err(StorageError::backend("offline"))
        }

        async fn get(&self, _: &str) -> StorageResult<Option<Blob>> {
            Err(StorageError::backend("offline"))
        }

        async fn head(&self, _: &str) -> StorageResult<Option<BlobMeta>> {
            Err(StorageError::backend("offline"))
        }

        async fn delete(&self, _: &str) -> StorageResult<bool> {
            Err(StorageError::backend("offline"))
        }
    }

    #[tokio::test]
    async fn cache_failures_degrade_without_failing() {
        let service = ValidationService::new(Arc::new(SecurityPolicy::strict()))
            .with_cache(ArtifactCache::new(Arc::new(Broken)));
        let outcome = service.validate(&python("z = 3")).await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.reasons().len(), 2);
        assert!(outcome.reasons()[0].starts_with("cache read failed"));
        assert!(outcome.reasons()[1].starts_with("cache write failed"));
    }
}
