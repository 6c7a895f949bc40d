//! Security policies for dynamic tool submissions.
//!
//! A [`SecurityPolicy`] is an immutable value. The [`PolicyEvaluator`]
//! applies one to a [`tool_analysis::ValidationResult`], producing ordered
//! [`PolicyViolation`]s from which a [`PolicyDecision`] can be derived.

#![warn(missing_docs, clippy::pedantic)]

pub mod decision;
pub mod error;
pub mod evaluator;
pub mod policy;
pub mod violation;

pub use decision::{DecisionKind, PolicyDecision};
pub use error::{PolicyError, PolicyResult};
pub use evaluator::{PolicyEvaluator, ViolationSummary, has_critical_violations};
pub use policy::{
    PERMISSIVE_POLICY_ID, PolicyRule, ResourceLimits, STRICT_POLICY_ID, SecurityPolicy,
};
pub use violation::{PolicyViolation, ViolationType};
