//! Policy violations and their static metadata.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use tool_analysis::{Finding, FindingKind};
use tool_primitives::Severity;

/// Category of a policy violation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    /// Reads or writes outside approved storage.
    FileSystemAccess,
    /// Outbound network use.
    NetworkAccess,
    /// Process spawning or other system calls.
    SystemCall,
    /// Dynamic code execution and similar constructs.
    DangerousFunction,
    /// Estimated resource usage beyond policy limits.
    ResourceLimit,
    /// Import of a prohibited module.
    ProhibitedImport,
}

impl ViolationType {
    /// Every violation type.
    pub const ALL: [Self; 6] = [
        Self::FileSystemAccess,
        Self::NetworkAccess,
        Self::SystemCall,
        Self::DangerousFunction,
        Self::ResourceLimit,
        Self::ProhibitedImport,
    ];

    /// Snake-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileSystemAccess => "file_system_access",
            Self::NetworkAccess => "network_access",
            Self::SystemCall => "system_call",
            Self::DangerousFunction => "dangerous_function",
            Self::ResourceLimit => "resource_limit",
            Self::ProhibitedImport => "prohibited_import",
        }
    }

    /// Policy rule identifier for this type.
    #[must_use]
    pub const fn rule_id(self) -> &'static str {
        match self {
            Self::FileSystemAccess => "FS001",
            Self::NetworkAccess => "NET001",
            Self::SystemCall => "SYS001",
            Self::DangerousFunction => "FUNC001",
            Self::ResourceLimit => "RES001",
            Self::ProhibitedImport => "IMP001",
        }
    }

    /// Generic remediation advice for this type.
    #[must_use]
    pub const fn remediation(self) -> &'static str {
        match self {
            Self::FileSystemAccess => {
                "Remove file system operations or use approved temporary storage APIs"
            }
            Self::NetworkAccess => "Remove network calls or use approved API endpoints",
            Self::SystemCall => "Remove system calls and process spawning operations",
            Self::DangerousFunction => "Replace dynamic code execution with safe alternatives",
            Self::ResourceLimit => "Optimize code to reduce resource usage",
            Self::ProhibitedImport => {
                "Remove prohibited module imports and use approved alternatives"
            }
        }
    }

    /// Violation type a finding of `kind` maps to.
    #[must_use]
    pub fn for_finding(kind: &FindingKind) -> Self {
        match kind {
            FindingKind::ProhibitedImport => Self::ProhibitedImport,
            FindingKind::ProhibitedBuiltin
            | FindingKind::DangerousPattern
            | FindingKind::ProhibitedGlobal
            | FindingKind::Linter { .. } => Self::DangerousFunction,
        }
    }
}

impl Display for ViolationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single breach of a security policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    violation_type: ViolationType,
    rule_id: String,
    severity: Severity,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snippet: Option<String>,
    remediation: String,
}

impl PolicyViolation {
    /// Resource-limit violation tagged with the `RES001` rule.
    #[must_use]
    pub fn resource_limit(
        severity: Severity,
        message: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            violation_type: ViolationType::ResourceLimit,
            rule_id: ViolationType::ResourceLimit.rule_id().to_owned(),
            severity,
            message: message.into(),
            line: None,
            snippet: None,
            remediation: remediation.into(),
        }
    }

    /// Returns the violation type.
    #[must_use]
    pub fn violation_type(&self) -> ViolationType {
        self.violation_type
    }

    /// Returns the rule identifier, e.g. `IMP001`.
    #[must_use]
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Returns the severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the 1-based line, if known.
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    /// Returns the offending source line, if known.
    #[must_use]
    pub fn snippet(&self) -> Option<&str> {
        self.snippet.as_deref()
    }

    /// Returns remediation advice.
    #[must_use]
    pub fn remediation(&self) -> &str {
        &self.remediation
    }

    /// Returns `true` for critical violations.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity.is_critical()
    }
}

impl From<&Finding> for PolicyViolation {
    fn from(finding: &Finding) -> Self {
        let violation_type = ViolationType::for_finding(finding.kind());
        Self {
            violation_type,
            rule_id: violation_type.rule_id().to_owned(),
            severity: finding.severity(),
            message: finding.message().to_owned(),
            line: finding.line(),
            snippet: finding.snippet().map(str::to_owned),
            remediation: violation_type.remediation().to_owned(),
        }
    }
}

impl Display for PolicyViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule_id, self.message)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}
