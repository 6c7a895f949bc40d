//! Admission decisions derived from policy violations.

use serde::{Deserialize, Serialize};
use tool_primitives::Severity;

use crate::violation::PolicyViolation;

/// Describes the outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Submission is admitted without reservations.
    Allow,
    /// Submission is rejected.
    Deny,
    /// Submission is admitted but carries high-severity violations that an
    /// operator should review.
    Escalate,
}

/// Structured decision derived from a violation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    kind: DecisionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    violated_rules: Vec<String>,
}

impl PolicyDecision {
    /// Returns an allow decision with no additional context.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            kind: DecisionKind::Allow,
            reason: None,
            violated_rules: Vec::new(),
        }
    }

    /// Returns a deny decision with an explanatory reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>, violated_rules: Vec<String>) -> Self {
        Self {
            kind: DecisionKind::Deny,
            reason: Some(reason.into()),
            violated_rules,
        }
    }

    /// Returns an escalate decision listing the rules that triggered it.
    #[must_use]
    pub fn escalate(reason: impl Into<String>, violated_rules: Vec<String>) -> Self {
        Self {
            kind: DecisionKind::Escalate,
            reason: Some(reason.into()),
            violated_rules,
        }
    }

    /// Derives a decision: any critical violation denies, any high one
    /// escalates, anything else allows.
    #[must_use]
    pub fn from_violations(violations: &[PolicyViolation]) -> Self {
        let rules_at = |severity: Severity| {
            let mut rules: Vec<String> = violations
                .iter()
                .filter(|violation| violation.severity() == severity)
                .map(|violation| violation.rule_id().to_owned())
                .collect();
            rules.sort();
            rules.dedup();
            rules
        };

        let critical: Vec<&str> = violations
            .iter()
            .filter(|violation| violation.is_critical())
            .map(PolicyViolation::message)
            .collect();
        if !critical.is_empty() {
            return Self::deny(critical.join("; "), rules_at(Severity::Critical));
        }

        let high = rules_at(Severity::High);
        if !high.is_empty() {
            return Self::escalate("high-severity policy violations present", high);
        }
        Self::allow()
    }

    /// Returns the decision kind.
    #[must_use]
    pub fn kind(&self) -> DecisionKind {
        self.kind
    }

    /// Returns true when the decision admits the submission.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        self.kind == DecisionKind::Allow
    }

    /// Returns true when the decision rejects the submission.
    #[must_use]
    pub fn is_deny(&self) -> bool {
        self.kind == DecisionKind::Deny
    }

    /// Returns true when the submission is admitted pending review.
    #[must_use]
    pub fn is_escalate(&self) -> bool {
        self.kind == DecisionKind::Escalate
    }

    /// Returns the optional reason associated with the decision.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns the rule identifiers behind a deny or escalate decision.
    #[must_use]
    pub fn violated_rules(&self) -> &[String] {
        &self.violated_rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tool_analysis::Finding;

    #[test]
    fn decision_helpers_work() {
        let allow = PolicyDecision::allow();
        assert!(allow.is_allow());
        assert!(!allow.is_deny());

        let deny = PolicyDecision::deny("blocked", vec!["IMP001".into()]);
        assert!(deny.is_deny());
        assert_eq!(deny.reason(), Some("blocked"));
        assert_eq!(deny.violated_rules(), ["IMP001"]);
    }

    #[test]
    fn derives_from_violation_severities() {
        assert!(PolicyDecision::from_violations(&[]).is_allow());

        let high = PolicyViolation::resource_limit(Severity::High, "too slow", "speed up");
        let decision = PolicyDecision::from_violations(std::slice::from_ref(&high));
        assert!(decision.is_escalate());
        assert_eq!(decision.violated_rules(), ["RES001"]);

        let critical = PolicyViolation::from(&Finding::prohibited_import("os"));
        let decision = PolicyDecision::from_violations(&[high, critical]);
        assert!(decision.is_deny());
        assert_eq!(decision.reason(), Some("Prohibited module import: os"));
        assert_eq!(decision.violated_rules(), ["IMP001"]);
    }
}
