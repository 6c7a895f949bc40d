//! Security policy value objects.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tool_analysis::AnalyzerRules;
use tool_analysis::rules::{
    JS_PROHIBITED_GLOBALS, JS_PROHIBITED_MODULES, PYTHON_PROHIBITED_BUILTINS,
    PYTHON_PROHIBITED_MODULES,
};
use tool_primitives::Severity;

use crate::error::{PolicyError, PolicyResult};
use crate::violation::ViolationType;

/// Identifier of the strict policy.
pub const STRICT_POLICY_ID: &str = "default-v1";
/// Identifier of the permissive policy.
pub const PERMISSIVE_POLICY_ID: &str = "permissive-v1";

/// Limits applied to a submission's resource estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum estimated memory in megabytes.
    pub max_memory_mb: u64,
    /// Maximum estimated CPU time in seconds.
    pub max_cpu_seconds: f64,
    /// Maximum complexity score.
    pub max_complexity: u32,
    /// Maximum block nesting depth.
    pub max_nesting_depth: u32,
    /// Whether loop constructs are admitted.
    pub allow_loops: bool,
    /// Whether recursive functions are admitted.
    pub allow_recursion: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: 512,
            max_cpu_seconds: 30.0,
            max_complexity: 50,
            max_nesting_depth: 10,
            allow_loops: true,
            allow_recursion: false,
        }
    }
}

/// Descriptive rule carried by a policy.
///
/// Rules document what a policy forbids and which identifiers its
/// violations carry; detection itself is done by the analyzers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule identifier, e.g. `NET001`.
    pub id: String,
    /// Violation category the rule covers.
    pub violation_type: ViolationType,
    /// Human-readable description.
    pub description: String,
    /// Severity assigned to breaches.
    pub severity: Severity,
    /// Source fragments the rule is concerned with.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Fragments explicitly exempted.
    #[serde(default)]
    pub allowed_exceptions: Vec<String>,
}

impl PolicyRule {
    fn new(
        violation_type: ViolationType,
        description: &str,
        severity: Severity,
        patterns: &[&str],
    ) -> Self {
        Self {
            id: violation_type.rule_id().to_owned(),
            violation_type,
            description: description.to_owned(),
            severity,
            patterns: patterns.iter().map(|p| (*p).to_owned()).collect(),
            allowed_exceptions: Vec::new(),
        }
    }
}

/// Immutable security policy.
///
/// Build one of the canonical instances with [`SecurityPolicy::strict`] or
/// [`SecurityPolicy::permissive`], or load one with
/// [`SecurityPolicy::from_json`], then share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    id: String,
    name: String,
    version: String,
    rules: Vec<PolicyRule>,
    limits: ResourceLimits,
    prohibited_modules: BTreeSet<String>,
    prohibited_functions: BTreeSet<String>,
    #[serde(default)]
    allowed_file_operations: Vec<String>,
    #[serde(default)]
    allowed_network_domains: Vec<String>,
}

impl SecurityPolicy {
    /// The default policy: no recursion, tight limits, every known
    /// dangerous module and function prohibited.
    #[must_use]
    pub fn strict() -> Self {
        let rules = vec![
            PolicyRule::new(
                ViolationType::FileSystemAccess,
                "Prohibit file system access outside temp directories",
                Severity::Critical,
                &["open(", "file(", "fs.", "readFile", "writeFile"],
            ),
            PolicyRule::new(
                ViolationType::NetworkAccess,
                "Prohibit all network access",
                Severity::Critical,
                &["socket", "http", "https", "fetch", "XMLHttpRequest"],
            ),
            PolicyRule::new(
                ViolationType::SystemCall,
                "Prohibit system calls and process spawning",
                Severity::Critical,
                &["subprocess", "child_process", "exec", "spawn"],
            ),
            PolicyRule::new(
                ViolationType::DangerousFunction,
                "Prohibit dangerous dynamic code execution",
                Severity::Critical,
                &["eval(", "exec(", "Function(", "compile("],
            ),
            PolicyRule::new(
                ViolationType::ResourceLimit,
                "Enforce resource usage limits",
                Severity::High,
                &[],
            ),
            PolicyRule::new(
                ViolationType::ProhibitedImport,
                "Prohibit imports of dangerous modules",
                Severity::Critical,
                &[],
            ),
        ];

        let prohibited_modules = PYTHON_PROHIBITED_MODULES
            .iter()
            .chain(JS_PROHIBITED_MODULES)
            .map(|name| (*name).to_owned())
            .collect();
        let prohibited_functions = PYTHON_PROHIBITED_BUILTINS
            .iter()
            .chain(JS_PROHIBITED_GLOBALS)
            .map(|name| (*name).to_owned())
            .collect();

        Self {
            id: STRICT_POLICY_ID.to_owned(),
            name: "Default Dynamic Tool Security Policy".to_owned(),
            version: "1.0.0".to_owned(),
            rules,
            limits: ResourceLimits::default(),
            prohibited_modules,
            prohibited_functions,
            allowed_file_operations: Vec::new(),
            allowed_network_domains: Vec::new(),
        }
    }

    /// Development policy: the strict policy with recursion admitted and a
    /// doubled complexity ceiling.
    #[must_use]
    pub fn permissive() -> Self {
        let mut policy = Self::strict();
        PERMISSIVE_POLICY_ID.clone_into(&mut policy.id);
        "Permissive Security Policy".clone_into(&mut policy.name);
        policy.limits.allow_recursion = true;
        policy.limits.max_complexity = 100;
        policy
    }

    /// Returns a copy with different resource limits.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPolicy`] when the limits are unusable.
    pub fn with_limits(mut self, limits: ResourceLimits) -> PolicyResult<Self> {
        self.limits = limits;
        self.validate()?;
        Ok(self)
    }

    /// Returns a copy with a new identity, for derived policies.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPolicy`] when `id` or `version` is blank.
    pub fn renamed(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> PolicyResult<Self> {
        self.id = id.into();
        self.name = name.into();
        self.version = version.into();
        self.validate()?;
        Ok(self)
    }

    /// Parses and validates a JSON policy document.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Serialization`] for malformed JSON and
    /// [`PolicyError::InvalidPolicy`] when validation fails.
    pub fn from_json(document: &str) -> PolicyResult<Self> {
        let policy: Self = serde_json::from_str(document)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Serializes the policy as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Serialization`] if serialization fails.
    pub fn to_json(&self) -> PolicyResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPolicy`] naming the failed check.
    pub fn validate(&self) -> PolicyResult<()> {
        if self.id.trim().is_empty() {
            return Err(PolicyError::invalid("policy id cannot be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(PolicyError::invalid("policy version cannot be empty"));
        }
        if self.limits.max_memory_mb == 0 {
            return Err(PolicyError::invalid("max_memory_mb must be positive"));
        }
        if !self.limits.max_cpu_seconds.is_finite() || self.limits.max_cpu_seconds <= 0.0 {
            return Err(PolicyError::invalid(
                "max_cpu_seconds must be a positive number",
            ));
        }
        if self.limits.max_complexity == 0 {
            return Err(PolicyError::invalid("max_complexity must be positive"));
        }
        if let Some(rule) = self.rules.iter().find(|rule| rule.id.trim().is_empty()) {
            return Err(PolicyError::invalid(format!(
                "rule for {} has an empty id",
                rule.violation_type
            )));
        }
        Ok(())
    }

    /// Analyzer tables narrowed to what this policy prohibits.
    #[must_use]
    pub fn analyzer_rules(&self) -> AnalyzerRules {
        AnalyzerRules::restricted_to(&self.prohibited_modules, &self.prohibited_functions)
    }

    /// Returns the policy identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the descriptive rules.
    #[must_use]
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Looks up a rule by identifier.
    #[must_use]
    pub fn rule(&self, id: &str) -> Option<&PolicyRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    /// Returns the resource limits.
    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Returns the prohibited module names.
    #[must_use]
    pub fn prohibited_modules(&self) -> &BTreeSet<String> {
        &self.prohibited_modules
    }

    /// Returns the prohibited function and global names.
    #[must_use]
    pub fn prohibited_functions(&self) -> &BTreeSet<String> {
        &self.prohibited_functions
    }

    /// Returns file operations explicitly allowed (empty in both canonical policies).
    #[must_use]
    pub fn allowed_file_operations(&self) -> &[String] {
        &self.allowed_file_operations
    }

    /// Returns network domains explicitly allowed (empty in both canonical policies).
    #[must_use]
    pub fn allowed_network_domains(&self) -> &[String] {
        &self.allowed_network_domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_policies_differ_only_where_expected() {
        let strict = SecurityPolicy::strict();
        let permissive = SecurityPolicy::permissive();
        assert_eq!(strict.id(), "default-v1");
        assert_eq!(permissive.id(), "permissive-v1");
        assert!(!strict.limits().allow_recursion);
        assert!(permissive.limits().allow_recursion);
        assert_eq!(strict.limits().max_complexity, 50);
        assert_eq!(permissive.limits().max_complexity, 100);
        assert_eq!(strict.prohibited_modules(), permissive.prohibited_modules());
        assert_eq!(strict.rules(), permissive.rules());
    }

    #[test]
    fn strict_policy_covers_both_languages() {
        let strict = SecurityPolicy::strict();
        for module in ["os", "subprocess", "child_process", "worker_threads"] {
            assert!(strict.prohibited_modules().contains(module), "{module}");
        }
        for function in ["eval", "open", "fetch", "WebSocket"] {
            assert!(strict.prohibited_functions().contains(function), "{function}");
        }
        assert_eq!(strict.rule("RES001").unwrap().severity, Severity::High);
        assert_eq!(strict.rules().len(), ViolationType::ALL.len());
    }

    #[test]
    fn json_round_trip_validates() {
        let json = SecurityPolicy::permissive().to_json().unwrap();
        let parsed = SecurityPolicy::from_json(&json).unwrap();
        assert_eq!(parsed, SecurityPolicy::permissive());

        let broken = json.replace("\"permissive-v1\"", "\"  \"");
        assert!(matches!(
            SecurityPolicy::from_json(&broken),
            Err(PolicyError::InvalidPolicy { .. })
        ));
        assert!(matches!(
            SecurityPolicy::from_json("{"),
            Err(PolicyError::Serialization { .. })
        ));
    }

    #[test]
    fn limits_are_validated() {
        let limits = ResourceLimits {
            max_cpu_seconds: f64::NAN,
            ..ResourceLimits::default()
        };
        assert!(SecurityPolicy::strict().with_limits(limits).is_err());
    }

    #[test]
    fn analyzer_rules_follow_prohibited_sets() {
        let rules = SecurityPolicy::strict().analyzer_rules();
        assert!(rules.python_module_prohibited("os"));
        assert!(rules.js_module_prohibited("fs"));
        assert!(rules.python_builtin_prohibited("exec"));
    }
}
