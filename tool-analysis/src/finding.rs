//! Findings produced by static analysis.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use tool_primitives::Severity;

/// Category of a finding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Import or `require` of a prohibited module.
    ProhibitedImport,
    /// Call to a prohibited Python builtin.
    ProhibitedBuiltin,
    /// Match against the dangerous-pattern table.
    DangerousPattern,
    /// Use of a prohibited JavaScript global.
    ProhibitedGlobal,
    /// Issue reported by an external security linter.
    Linter {
        /// Linter-specific test identifier (e.g. Bandit's `B307`).
        test_id: String,
    },
}

impl Display for FindingKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProhibitedImport => f.write_str("prohibited_import"),
            Self::ProhibitedBuiltin => f.write_str("prohibited_builtin"),
            Self::DangerousPattern => f.write_str("dangerous_pattern"),
            Self::ProhibitedGlobal => f.write_str("prohibited_global"),
            Self::Linter { test_id } => write!(f, "linter:{test_id}"),
        }
    }
}

/// A single issue detected in submitted source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    severity: Severity,
    kind: FindingKind,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snippet: Option<String>,
}

impl Finding {
    /// Creates a finding with no location.
    #[must_use]
    pub fn new(severity: Severity, kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            subject: None,
            line: None,
            snippet: None,
        }
    }

    /// Critical finding for a module named in an import.
    #[must_use]
    pub fn prohibited_import(module: &str) -> Self {
        Self::new(
            Severity::Critical,
            FindingKind::ProhibitedImport,
            format!("Prohibited module import: {module}"),
        )
        .with_subject(module)
    }

    /// Critical finding for a prohibited builtin call.
    #[must_use]
    pub fn prohibited_builtin(name: &str) -> Self {
        Self::new(
            Severity::Critical,
            FindingKind::ProhibitedBuiltin,
            format!("Prohibited built-in function: {name}"),
        )
        .with_subject(name)
    }

    /// Names the module, builtin or global the finding is about.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attaches a 1-based line number and the trimmed source line.
    #[must_use]
    pub fn at_line(mut self, line: usize, snippet: impl Into<String>) -> Self {
        self.line = Some(line);
        let snippet = snippet.into();
        if !snippet.is_empty() {
            self.snippet = Some(snippet);
        }
        self
    }

    /// Returns the severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the kind.
    #[must_use]
    pub fn kind(&self) -> &FindingKind {
        &self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the module, builtin or global the finding names, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns the 1-based line number, if known.
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    /// Returns the offending source line, if captured.
    #[must_use]
    pub fn snippet(&self) -> Option<&str> {
        self.snippet.as_deref()
    }

    /// Returns `true` for critical findings.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity.is_critical()
    }
}

/// Returns the trimmed text of 1-based `line` in `source`, or an empty string.
pub(crate) fn line_snippet(source: &str, line: usize) -> String {
    line.checked_sub(1)
        .and_then(|idx| source.lines().nth(idx))
        .map(|text| text.trim().to_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_as_snake_case_tag() {
        let json = serde_json::to_string(&FindingKind::ProhibitedImport).unwrap();
        assert_eq!(json, "\"prohibited_import\"");
        assert_eq!(
            FindingKind::Linter {
                test_id: "B307".into()
            }
            .to_string(),
            "linter:B307"
        );
    }

    #[test]
    fn snippet_lookup_is_one_based() {
        let source = "a = 1\n   import os  \n";
        assert_eq!(line_snippet(source, 2), "import os");
        assert_eq!(line_snippet(source, 0), "");
        assert_eq!(line_snippet(source, 9), "");
    }
}
