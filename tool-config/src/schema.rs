//! Strongly typed configuration schemas.

use std::path::PathBuf;

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use tool_policy::SecurityPolicy;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Which security policy to enforce.
    pub policy: PolicyConfig,
    /// Artifact cache storage.
    pub cache: CacheConfig,
    /// External security linter.
    pub linter: LinterConfig,
    /// Defaults recorded on artifacts and used while waiting on executions.
    pub execution: ExecutionConfig,
    /// Audit trail.
    pub audit: AuditConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    /// Checks cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.cache.backend == CacheBackend::Filesystem && self.cache.root.is_none() {
            bail!("cache.root is required for the filesystem backend");
        }
        ensure!(self.cache.usage_retries > 0, "cache.usage_retries must be greater than zero");
        ensure!(
            self.linter.timeout_seconds > 0,
            "linter.timeout_seconds must be greater than zero"
        );
        ensure!(
            !self.linter.program.trim().is_empty(),
            "linter.program cannot be empty"
        );
        ensure!(
            self.execution.timeout_seconds > 0,
            "execution.timeout_seconds must be greater than zero"
        );
        ensure!(
            self.execution.poll_interval_ms > 0,
            "execution.poll_interval_ms must be greater than zero"
        );
        ensure!(self.audit.capacity > 0, "audit.capacity must be greater than zero");
        Ok(())
    }
}

/// Built-in policies selectable by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyPreset {
    /// Recursion disallowed, complexity ceiling 50.
    #[default]
    Strict,
    /// Recursion allowed, complexity ceiling 100.
    Permissive,
}

impl PolicyPreset {
    /// Parses a preset name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => bail!("unknown policy preset `{other}` (expected strict or permissive)"),
        }
    }
}

/// Policy selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Built-in policy used when `path` is unset.
    pub preset: PolicyPreset,
    /// JSON policy document overriding the preset.
    pub path: Option<PathBuf>,
}

impl PolicyConfig {
    /// Builds the selected policy.
    ///
    /// # Errors
    ///
    /// Fails when the policy document cannot be read or is invalid.
    pub fn load(&self) -> Result<SecurityPolicy> {
        let Some(path) = &self.path else {
            return Ok(match self.preset {
                PolicyPreset::Strict => SecurityPolicy::strict(),
                PolicyPreset::Permissive => SecurityPolicy::permissive(),
            });
        };
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read policy {}", path.display()))?;
        SecurityPolicy::from_json(&document)
            .with_context(|| format!("invalid policy document {}", path.display()))
    }
}

/// Where artifacts are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process memory; lost on exit.
    #[default]
    Memory,
    /// A directory tree under `cache.root`.
    Filesystem,
}

/// Artifact cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Storage backend.
    pub backend: CacheBackend,
    /// Root directory for the filesystem backend.
    pub root: Option<PathBuf>,
    /// Attempts for conditional usage-count updates.
    pub usage_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            root: None,
            usage_retries: 8,
        }
    }
}

/// Security linter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinterConfig {
    /// Run the linter after Python analysis.
    pub enabled: bool,
    /// Executable name or path.
    pub program: String,
    /// Per-run timeout.
    pub timeout_seconds: u64,
}

impl Default for LinterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "bandit".into(),
            timeout_seconds: 5,
        }
    }
}

/// Execution defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Timeout recorded on new artifacts.
    pub timeout_seconds: u64,
    /// Interval between backend polls.
    pub poll_interval_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            poll_interval_ms: 250,
        }
    }
}

/// Audit trail settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Append entries to this file; unset keeps them in memory.
    pub path: Option<PathBuf>,
    /// Entries retained by the in-memory log.
    pub capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity: 1024,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit newline-delimited JSON.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
