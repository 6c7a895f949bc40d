//! Static analysis of submitted tool source.
//!
//! [`CodeAnalyzer`] dispatches on [`Language`]: Python goes through a
//! structural statement tree, JavaScript and TypeScript through a lexical
//! scan. Both produce a [`ValidationResult`] with findings and a
//! [`ResourceEstimate`].

#![warn(missing_docs, clippy::pedantic)]

pub mod estimate;
pub mod finding;
pub mod javascript;
pub mod linter;
pub mod python;
pub mod result;
pub mod rules;

use std::sync::Arc;

use tool_primitives::Language;
use tracing::{debug, warn};

pub use estimate::ResourceEstimate;
pub use finding::{Finding, FindingKind};
pub use javascript::JavaScriptAnalyzer;
pub use linter::{BanditLinter, LinterError, SecurityLinter};
pub use python::PythonAnalyzer;
pub use result::ValidationResult;
pub use rules::AnalyzerRules;

/// Message recorded for blank submissions.
pub const EMPTY_SOURCE_ERROR: &str = "Empty code provided";

/// Language dispatcher with an optional security linter for Python.
#[derive(Clone, Default)]
pub struct CodeAnalyzer {
    python: PythonAnalyzer,
    javascript: JavaScriptAnalyzer,
    linter: Option<Arc<dyn SecurityLinter>>,
}

impl std::fmt::Debug for CodeAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeAnalyzer")
            .field("linter", &self.linter.as_ref().map(|linter| linter.name()))
            .finish_non_exhaustive()
    }
}

impl CodeAnalyzer {
    /// Creates an analyzer with the given prohibited-name tables and no linter.
    #[must_use]
    pub fn new(rules: AnalyzerRules) -> Self {
        Self {
            python: PythonAnalyzer::new(rules.clone()),
            javascript: JavaScriptAnalyzer::new(rules),
            linter: None,
        }
    }

    /// Attaches a linter run after successful Python analysis.
    #[must_use]
    pub fn with_linter(mut self, linter: Arc<dyn SecurityLinter>) -> Self {
        self.linter = Some(linter);
        self
    }

    /// Structural analysis only. Deterministic and free of I/O.
    #[must_use]
    pub fn analyze_static(&self, source: &str, language: Language) -> ValidationResult {
        if source.trim().is_empty() {
            let mut result = ValidationResult::new(language, source);
            result.push_error(EMPTY_SOURCE_ERROR);
            return result;
        }
        let result = match language {
            Language::Python => self.python.analyze(source),
            Language::JavaScript | Language::TypeScript => {
                self.javascript.analyze(source, language)
            }
        };
        debug!(
            %language,
            hash = %result.content_hash,
            findings = result.findings.len(),
            errors = result.errors.len(),
            "static analysis complete"
        );
        result
    }

    /// Structural analysis followed by the linter, when one is attached and
    /// the source is Python that parsed cleanly.
    ///
    /// Linter failures become warnings; they never change `is_valid` on
    /// their own.
    pub async fn analyze(&self, source: &str, language: Language) -> ValidationResult {
        let mut result = self.analyze_static(source, language);
        let Some(linter) = &self.linter else {
            return result;
        };
        if language != Language::Python || result.estimate.is_none() {
            return result;
        }
        match linter.lint(source).await {
            Ok(findings) => {
                for finding in findings {
                    result.push_finding(finding);
                }
            }
            Err(err) => {
                warn!(linter = linter.name(), error = %err, "security linter unavailable");
                result.push_warning(err.to_string());
            }
        }
        result
    }
}
