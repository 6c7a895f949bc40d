use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dyntools::analysis::{CodeAnalyzer, Finding, FindingKind, LinterError, SecurityLinter};
use dyntools::cache::{ArtifactCache, MemoryBlobStore};
use dyntools::policy::SecurityPolicy;
use dyntools::primitives::{ContentHash, Language, Outcome, Severity};
use dyntools::validation::{CacheMode, ValidationError, ValidationRequest, ValidationService};

#[derive(Default)]
struct CountingLinter {
    runs: AtomicUsize,
}

#[async_trait]
impl SecurityLinter for CountingLinter {
    fn name(&self) -> &str {
        "counting"
    }

    async fn lint(&self, _source: &str) -> Result<Vec<Finding>, LinterError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

fn cached_service(policy: SecurityPolicy) -> ValidationService {
    ValidationService::new(Arc::new(policy))
        .with_cache(ArtifactCache::new(Arc::new(MemoryBlobStore::new())))
}

#[test]
fn content_hash_is_deterministic_and_trim_insensitive() {
    let source = "def add(a, b):\n    return a + b";
    let hash = ContentHash::compute(Language::Python, source);
    assert_eq!(hash, ContentHash::compute(Language::Python, source));
    assert_eq!(
        hash,
        ContentHash::compute(Language::Python, &format!("\n\n  {source}\n\t"))
    );
    assert_ne!(hash, ContentHash::compute(Language::JavaScript, source));
    assert_ne!(
        hash,
        ContentHash::compute(Language::Python, "def add(a, b):\n    return b + a")
    );

    let parsed: ContentHash = hash.to_string().parse().unwrap();
    assert_eq!(parsed, hash);
    assert_eq!(hash.to_string().len(), 64);
}

#[tokio::test]
async fn second_validation_is_a_cache_hit_with_one_analysis() {
    let linter = Arc::new(CountingLinter::default());
    let service = cached_service(SecurityPolicy::strict()).with_linter(linter.clone());
    let request = ValidationRequest::new(Language::Python, "def square(x):\n    return x * x\n");

    let first = service.validate(&request).await.into_result().unwrap();
    let second = service.validate(&request).await.into_result().unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.result, second.result);
    assert_eq!(linter.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn prohibited_import_example_is_rejected() {
    let source = "import os\ndef f(): os.system('x')";
    let analyzer = CodeAnalyzer::new(SecurityPolicy::strict().analyzer_rules());
    let result = analyzer.analyze(source, Language::Python).await;

    assert!(!result.is_valid);
    let imports: Vec<_> = result
        .findings
        .iter()
        .filter(|finding| {
            finding.is_critical() && finding.kind() == &FindingKind::ProhibitedImport
        })
        .collect();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].subject(), Some("os"));
    assert_eq!(imports[0].kind().to_string(), "prohibited_import");

    let service = cached_service(SecurityPolicy::strict());
    let err = service
        .validate(&ValidationRequest::new(Language::Python, source))
        .await
        .into_result()
        .unwrap_err();
    assert!(err.is_rejected());
    assert!(
        err.critical_messages()
            .iter()
            .any(|message| message.contains("os"))
    );
}

#[tokio::test]
async fn prohibited_calls_are_critical_in_both_languages() {
    let service = cached_service(SecurityPolicy::strict());

    let python = service
        .validate_safe(&ValidationRequest::new(Language::Python, "x = eval('1 + 1')"))
        .await;
    assert!(!python.is_accepted());
    assert!(
        python
            .result
            .findings
            .iter()
            .any(|finding| finding.severity() == Severity::Critical
                && finding.subject() == Some("eval"))
    );

    let javascript = service
        .validate_safe(&ValidationRequest::new(
            Language::JavaScript,
            "const fs = require('fs');\nfs.readFileSync('/etc/passwd');",
        ))
        .await;
    assert!(!javascript.is_accepted());
    assert!(javascript.result.has_critical_findings());
}

#[tokio::test]
async fn recursion_example_depends_on_policy() {
    let request = ValidationRequest::new(Language::Python, "def f(n): return f(n-1)");

    let strict = cached_service(SecurityPolicy::strict());
    let err = strict.validate(&request).await.into_result().unwrap_err();
    let ValidationError::Rejected { violations, .. } = &err else {
        panic!("expected rejection, got {err:?}");
    };
    assert!(
        violations
            .iter()
            .any(|violation| violation.rule_id() == "RES001" && violation.is_critical())
    );

    let permissive = cached_service(SecurityPolicy::permissive());
    let outcome = permissive.validate(&request).await;
    assert!(matches!(outcome, Outcome::Succeeded(_)));
}

#[tokio::test]
async fn summaries_count_what_the_report_holds() {
    let service = cached_service(SecurityPolicy::strict());
    let report = service
        .validate_safe(&ValidationRequest::new(
            Language::Python,
            "import subprocess\nsubprocess.run(['ls'])",
        ))
        .await;
    let summary = service.summary(&report);
    assert!(!summary.is_valid);
    assert!(summary.has_critical_issues);
    assert_eq!(summary.finding_count, report.result.findings.len());
    assert_eq!(summary.violation_count, report.violations.len());
    assert_eq!(summary.content_hash, report.content_hash());
}

#[tokio::test]
async fn refresh_keeps_the_usage_count() {
    let service = cached_service(SecurityPolicy::strict());
    let request = ValidationRequest::new(Language::Python, "def triple(x):\n    return x * 3\n");
    for _ in 0..3 {
        service.validate(&request).await.into_result().unwrap();
    }
    let cache = service.cache().unwrap();
    let hash = ContentHash::compute(Language::Python, request.source());
    assert_eq!(cache.retrieve(&hash).await.unwrap().unwrap().usage_count, 2);

    let refreshed = service
        .validate(&request.clone().with_cache_mode(CacheMode::Refresh))
        .await
        .into_result()
        .unwrap();
    assert!(!refreshed.cache_hit);
    assert_eq!(cache.retrieve(&hash).await.unwrap().unwrap().usage_count, 2);
}
