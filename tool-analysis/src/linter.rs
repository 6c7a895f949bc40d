//! External security linters.
//!
//! Linters are optional. Their failures never fail analysis; the analyzer
//! turns a [`LinterError`] into a warning on the result.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tool_primitives::Severity;
use tracing::debug;

use crate::finding::{Finding, FindingKind};

/// Default wall-clock budget for a linter run.
pub const DEFAULT_LINTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors produced while running a linter.
#[derive(Debug, Error)]
pub enum LinterError {
    /// The linter executable could not be found.
    #[error("{linter} not available for security scanning")]
    Unavailable {
        /// Linter name.
        linter: String,
    },
    /// The linter did not finish in time.
    #[error("{linter} scan timed out")]
    TimedOut {
        /// Linter name.
        linter: String,
    },
    /// The linter ran but failed or produced unusable output.
    #[error("{linter} scan failed: {reason}")]
    Failed {
        /// Linter name.
        linter: String,
        /// Failure description.
        reason: String,
    },
}

/// A security linter run over Python source after structural analysis.
#[async_trait]
pub trait SecurityLinter: Send + Sync {
    /// Display name used in warnings.
    fn name(&self) -> &str;

    /// Lints `source`.
    ///
    /// # Errors
    ///
    /// Returns [`LinterError`] when the linter cannot be run or its output
    /// cannot be understood.
    async fn lint(&self, source: &str) -> Result<Vec<Finding>, LinterError>;
}

/// Runs [Bandit](https://bandit.readthedocs.io) as a subprocess, feeding
/// source over stdin and parsing its JSON report.
#[derive(Debug, Clone)]
pub struct BanditLinter {
    program: String,
    timeout: Duration,
}

impl Default for BanditLinter {
    fn default() -> Self {
        Self::new("bandit", DEFAULT_LINTER_TIMEOUT)
    }
}

impl BanditLinter {
    /// Creates a linter invoking `program` with the given timeout.
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn failed(&self, reason: impl Into<String>) -> LinterError {
        LinterError::Failed {
            linter: self.name().to_owned(),
            reason: reason.into(),
        }
    }

    async fn run(&self, source: &str) -> Result<std::process::Output, LinterError> {
        let mut child = Command::new(&self.program)
            .args(["-f", "json", "-q", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => LinterError::Unavailable {
                    linter: self.name().to_owned(),
                },
                _ => self.failed(err.to_string()),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .await
                .map_err(|err| self.failed(err.to_string()))?;
        }
        child
            .wait_with_output()
            .await
            .map_err(|err| self.failed(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct BanditReport {
    #[serde(default)]
    results: Vec<BanditIssue>,
}

#[derive(Debug, Deserialize)]
struct BanditIssue {
    #[serde(default)]
    issue_severity: Option<String>,
    #[serde(default)]
    test_id: Option<String>,
    #[serde(default)]
    issue_text: Option<String>,
    #[serde(default)]
    line_number: Option<usize>,
    #[serde(default)]
    code: Option<String>,
}

impl From<BanditIssue> for Finding {
    fn from(issue: BanditIssue) -> Self {
        let severity = issue
            .issue_severity
            .as_deref()
            .and_then(|raw| raw.parse::<Severity>().ok())
            .map_or(Severity::Medium, |severity| severity.min(Severity::High));
        let finding = Finding::new(
            severity,
            FindingKind::Linter {
                test_id: issue.test_id.unwrap_or_else(|| "unknown".to_owned()),
            },
            issue
                .issue_text
                .unwrap_or_else(|| "Security issue detected".to_owned()),
        );
        match issue.line_number {
            Some(line) => finding.at_line(line, issue.code.unwrap_or_default().trim()),
            None => finding,
        }
    }
}

/// Parses a Bandit JSON report into findings.
pub(crate) fn parse_bandit_report(stdout: &[u8]) -> Result<Vec<Finding>, serde_json::Error> {
    let report: BanditReport = serde_json::from_slice(stdout)?;
    Ok(report.results.into_iter().map(Finding::from).collect())
}

#[async_trait]
impl SecurityLinter for BanditLinter {
    fn name(&self) -> &str {
        "Bandit"
    }

    async fn lint(&self, source: &str) -> Result<Vec<Finding>, LinterError> {
        let output = tokio::time::timeout(self.timeout, self.run(source))
            .await
            .map_err(|_| LinterError::TimedOut {
                linter: self.name().to_owned(),
            })??;

        // Bandit exits non-zero when it finds issues, so only an empty
        // report counts as failure.
        if output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(format!("{} ({})", output.status, stderr.trim())));
        }
        let findings =
            parse_bandit_report(&output.stdout).map_err(|err| self.failed(err.to_string()))?;
        debug!(count = findings.len(), "bandit report parsed");
        Ok(findings)
    }
}
