//! Evaluation of analysis results against a security policy.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tool_analysis::{ResourceEstimate, ValidationResult};
use tool_primitives::Severity;
use tracing::debug;

use crate::policy::SecurityPolicy;
use crate::violation::{PolicyViolation, ViolationType};

/// Turns findings and resource estimates into policy violations.
///
/// Evaluation is pure: the same result and policy always produce the same
/// ordered violations.
#[derive(Debug, Clone)]
pub struct PolicyEvaluator {
    policy: Arc<SecurityPolicy>,
}

impl PolicyEvaluator {
    /// Creates an evaluator enforcing `policy`.
    #[must_use]
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }

    /// Returns the enforced policy.
    #[must_use]
    pub fn policy(&self) -> &Arc<SecurityPolicy> {
        &self.policy
    }

    /// Resource-limit violations followed by one violation per finding.
    #[must_use]
    pub fn evaluate(&self, result: &ValidationResult) -> Vec<PolicyViolation> {
        let mut violations = result
            .estimate
            .as_ref()
            .map(|estimate| self.check_resource_limits(estimate))
            .unwrap_or_default();
        violations.extend(result.findings.iter().map(PolicyViolation::from));
        debug!(
            policy = self.policy.id(),
            hash = %result.content_hash,
            violations = violations.len(),
            "policy evaluated"
        );
        violations
    }

    /// Checks memory, cpu, complexity, nesting, recursion and loops, in
    /// that order.
    #[must_use]
    pub fn check_resource_limits(&self, estimate: &ResourceEstimate) -> Vec<PolicyViolation> {
        let limits = self.policy.limits();
        let mut violations = Vec::new();

        if estimate.memory_mb > limits.max_memory_mb {
            violations.push(PolicyViolation::resource_limit(
                Severity::High,
                format!(
                    "Estimated memory usage ({}MB) exceeds limit ({}MB)",
                    estimate.memory_mb, limits.max_memory_mb
                ),
                "Reduce code complexity or data structures",
            ));
        }
        if estimate.cpu_seconds > limits.max_cpu_seconds {
            violations.push(PolicyViolation::resource_limit(
                Severity::High,
                format!(
                    "Estimated CPU time ({:.2}s) exceeds limit ({:.2}s)",
                    estimate.cpu_seconds, limits.max_cpu_seconds
                ),
                "Optimize algorithms or reduce iterations",
            ));
        }
        if estimate.complexity > limits.max_complexity {
            violations.push(PolicyViolation::resource_limit(
                Severity::Medium,
                format!(
                    "Code complexity ({}) exceeds limit ({})",
                    estimate.complexity, limits.max_complexity
                ),
                "Simplify code structure and reduce nesting",
            ));
        }
        if estimate.nesting_depth > limits.max_nesting_depth {
            violations.push(PolicyViolation::resource_limit(
                Severity::Medium,
                format!(
                    "Nesting depth ({}) exceeds limit ({})",
                    estimate.nesting_depth, limits.max_nesting_depth
                ),
                "Reduce nesting by extracting functions",
            ));
        }
        if estimate.has_recursion() && !limits.allow_recursion {
            violations.push(PolicyViolation::resource_limit(
                Severity::Critical,
                "Recursion is not allowed by security policy",
                "Convert recursive logic to iterative approach",
            ));
        }
        if estimate.has_loops() && !limits.allow_loops {
            violations.push(PolicyViolation::resource_limit(
                Severity::High,
                "Loops are not allowed by security policy",
                "Replace loops with bounded operations on the input",
            ));
        }
        violations
    }
}

/// Returns `true` if any violation is critical.
#[must_use]
pub fn has_critical_violations(violations: &[PolicyViolation]) -> bool {
    violations.iter().any(PolicyViolation::is_critical)
}

/// Counts of violations by severity and by type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationSummary {
    /// Total number of violations.
    pub total: usize,
    /// Critical violations.
    pub critical: usize,
    /// High-severity violations.
    pub high: usize,
    /// Medium-severity violations.
    pub medium: usize,
    /// Low-severity violations.
    pub low: usize,
    /// Count per violation type; types with no violations are absent.
    pub by_type: BTreeMap<ViolationType, usize>,
}

impl ViolationSummary {
    /// Aggregates `violations`.
    #[must_use]
    pub fn from_violations(violations: &[PolicyViolation]) -> Self {
        let mut summary = Self {
            total: violations.len(),
            ..Self::default()
        };
        for violation in violations {
            match violation.severity() {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
            *summary
                .by_type
                .entry(violation.violation_type())
                .or_default() += 1;
        }
        summary
    }
}
