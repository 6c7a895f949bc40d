//! Configuration loader: TOML file, then `DYNTOOLS_*` environment overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::schema::{CacheBackend, PolicyPreset, RuntimeConfig};

/// Prefix shared by every recognised environment variable.
pub const ENV_PREFIX: &str = "DYNTOOLS_";

/// Loads [`RuntimeConfig`] from an optional file plus environment overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader using defaults and the environment only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `path` before applying overrides.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Loads, overrides from the process environment and validates.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed, an override is
    /// malformed, or validation fails.
    pub fn load(&self) -> Result<RuntimeConfig> {
        self.load_with(std::env::vars())
    }

    /// Same as [`load`](Self::load) with an explicit variable set.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_with<I, K, V>(&self, vars: I) -> Result<RuntimeConfig>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = match &self.path {
            Some(path) => read_file(path)?,
            None => RuntimeConfig::default(),
        };
        apply_overrides(&mut config, vars)?;
        config.validate()?;
        Ok(config)
    }
}

/// Parses a TOML document. Missing sections take their defaults.
///
/// # Errors
///
/// Fails on malformed TOML or unknown keys.
pub fn from_toml_str(document: &str) -> Result<RuntimeConfig> {
    toml::from_str(document).context("invalid runtime configuration")
}

fn read_file(path: &Path) -> Result<RuntimeConfig> {
    let document = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = from_toml_str(&document)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    info!(path = %path.display(), "loaded runtime configuration");
    Ok(config)
}

/// Applies `DYNTOOLS_*` variables on top of `config`. Unrecognised names
/// under the prefix are ignored.
///
/// # Errors
///
/// Fails when a value cannot be parsed for its setting.
pub fn apply_overrides<I, K, V>(config: &mut RuntimeConfig, vars: I) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    for (key, value) in vars {
        let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let value = value.as_ref();
        match name {
            "POLICY" => config.policy.preset = PolicyPreset::parse(value)?,
            "POLICY_PATH" => config.policy.path = Some(PathBuf::from(value)),
            "CACHE_BACKEND" => config.cache.backend = parse_backend(value)?,
            "CACHE_ROOT" => config.cache.root = Some(PathBuf::from(value)),
            "CACHE_USAGE_RETRIES" => config.cache.usage_retries = parse(name, value)?,
            "LINTER_ENABLED" => config.linter.enabled = parse_bool(name, value)?,
            "LINTER_PROGRAM" => config.linter.program = value.to_owned(),
            "LINTER_TIMEOUT_SECONDS" => config.linter.timeout_seconds = parse(name, value)?,
            "EXECUTION_TIMEOUT_SECONDS" => config.execution.timeout_seconds = parse(name, value)?,
            "EXECUTION_POLL_INTERVAL_MS" => {
                config.execution.poll_interval_ms = parse(name, value)?;
            }
            "AUDIT_PATH" => config.audit.path = Some(PathBuf::from(value)),
            "AUDIT_CAPACITY" => config.audit.capacity = parse(name, value)?,
            "LOG_LEVEL" => config.logging.level = value.to_owned(),
            "LOG_JSON" => config.logging.json = parse_bool(name, value)?,
            _ => continue,
        }
        debug!(variable = %key.as_ref(), "applied environment override");
    }
    Ok(())
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value `{value}` for {ENV_PREFIX}{name}"))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("invalid boolean `{value}` for {ENV_PREFIX}{name}"),
    }
}

fn parse_backend(value: &str) -> Result<CacheBackend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "memory" => Ok(CacheBackend::Memory),
        "filesystem" | "fs" => Ok(CacheBackend::Filesystem),
        other => bail!("unknown cache backend `{other}` (expected memory or filesystem)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
        [policy]
        preset = "permissive"

        [cache]
        backend = "filesystem"
        root = "/var/lib/dyntools"

        [execution]
        timeout_seconds = 10
    "#;

    #[test]
    fn partial_documents_keep_defaults() {
        let config = from_toml_str(DOCUMENT).unwrap();
        assert_eq!(config.policy.preset, PolicyPreset::Permissive);
        assert_eq!(config.cache.backend, CacheBackend::Filesystem);
        assert_eq!(config.cache.usage_retries, 8);
        assert_eq!(config.execution.timeout_seconds, 10);
        assert_eq!(config.execution.poll_interval_ms, 250);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(from_toml_str("[cache]\nbackend = \"memory\"\nsize = 3\n").is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dyntools.toml");
        std::fs::write(&path, DOCUMENT).unwrap();

        let config = ConfigLoader::new()
            .with_path(&path)
            .load_with([
                ("DYNTOOLS_POLICY", "strict"),
                ("DYNTOOLS_LINTER_ENABLED", "yes"),
                ("DYNTOOLS_EXECUTION_TIMEOUT_SECONDS", "45"),
                ("DYNTOOLS_LOG_JSON", "1"),
                ("DYNTOOLS_UNRELATED", "ignored"),
                ("HOME", "/root"),
            ])
            .unwrap();
        assert_eq!(config.policy.preset, PolicyPreset::Strict);
        assert!(config.linter.enabled);
        assert_eq!(config.execution.timeout_seconds, 45);
        assert!(config.logging.json);
        assert_eq!(config.cache.root.as_deref(), Some(Path::new("/var/lib/dyntools")));
    }

    #[test]
    fn malformed_overrides_fail() {
        let loader = ConfigLoader::new();
        let err = loader
            .load_with([("DYNTOOLS_AUDIT_CAPACITY", "many")])
            .unwrap_err();
        assert!(err.to_string().contains("DYNTOOLS_AUDIT_CAPACITY"));

        assert!(loader.load_with([("DYNTOOLS_LOG_JSON", "maybe")]).is_err());
        assert!(
            loader
                .load_with([("DYNTOOLS_CACHE_BACKEND", "filesystem")])
                .is_err()
        );
    }

    #[test]
    fn missing_files_fail() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new().with_path(dir.path().join("absent.toml"));
        assert!(loader.load_with(Vec::<(String, String)>::new()).is_err());
    }
}
