//! Wires the runtime crates together from a [`RuntimeConfig`].

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tool_analysis::BanditLinter;
use tool_cache::{
    ArtifactCache, AuditLog, BlobStore, FileAuditLog, FsBlobStore, MemoryAuditLog, MemoryBlobStore,
};
use tool_config::{CacheBackend, RuntimeConfig};
use tool_lifecycle::{MemoryGateway, MemoryToolIndex, ToolGateway, ToolIndex, ToolLifecycleManager};
use tool_policy::SecurityPolicy;
use tool_validation::ValidationService;
use tracing::info;

/// Validation service and lifecycle manager sharing one policy, cache and
/// audit log.
pub struct Runtime {
    policy: Arc<SecurityPolicy>,
    validation: ValidationService,
    lifecycle: ToolLifecycleManager,
    audit: Arc<dyn AuditLog>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("policy", &self.policy.id())
            .field("validation", &self.validation)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Builds a runtime with an in-memory tool index and gateway.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or the policy, cache
    /// directory or audit file cannot be opened.
    pub async fn from_config(config: &RuntimeConfig) -> Result<Self> {
        Self::with_backends(
            config,
            Arc::new(MemoryToolIndex::new()),
            Arc::new(MemoryGateway::new()),
        )
        .await
    }

    /// Builds a runtime around caller-provided index and gateway backends.
    ///
    /// # Errors
    ///
    /// See [`from_config`](Self::from_config).
    pub async fn with_backends(
        config: &RuntimeConfig,
        index: Arc<dyn ToolIndex>,
        gateway: Arc<dyn ToolGateway>,
    ) -> Result<Self> {
        config.validate()?;
        let policy = Arc::new(config.policy.load()?);

        let store: Arc<dyn BlobStore> = match (config.cache.backend, &config.cache.root) {
            (CacheBackend::Filesystem, Some(root)) => Arc::new(
                FsBlobStore::open(root)
                    .await
                    .with_context(|| format!("failed to open cache at {}", root.display()))?,
            ),
            _ => Arc::new(MemoryBlobStore::new()),
        };
        let cache = ArtifactCache::new(store).with_usage_retries(config.cache.usage_retries);

        let audit: Arc<dyn AuditLog> = match &config.audit.path {
            Some(path) => Arc::new(
                FileAuditLog::open(path)
                    .await
                    .with_context(|| format!("failed to open audit log {}", path.display()))?,
            ),
            None => Arc::new(MemoryAuditLog::new(
                NonZeroUsize::new(config.audit.capacity).context("audit.capacity is zero")?,
            )),
        };

        let mut validation = ValidationService::new(Arc::clone(&policy))
            .with_cache(cache.clone())
            .with_audit(Arc::clone(&audit));
        if config.linter.enabled {
            validation = validation.with_linter(Arc::new(BanditLinter::new(
                config.linter.program.clone(),
                Duration::from_secs(config.linter.timeout_seconds),
            )));
        }

        let lifecycle = ToolLifecycleManager::new(validation.clone(), cache, index, gateway)
            .with_execution_timeout(config.execution.timeout_seconds)
            .with_poll_interval(Duration::from_millis(config.execution.poll_interval_ms));

        info!(
            policy = %policy.id(),
            cache = ?config.cache.backend,
            linter = config.linter.enabled,
            "runtime assembled"
        );
        Ok(Self {
            policy,
            validation,
            lifecycle,
            audit,
        })
    }

    /// Returns the enforced policy.
    #[must_use]
    pub fn policy(&self) -> &Arc<SecurityPolicy> {
        &self.policy
    }

    /// Returns the validation service.
    #[must_use]
    pub fn validation(&self) -> &ValidationService {
        &self.validation
    }

    /// Returns the lifecycle manager.
    #[must_use]
    pub fn lifecycle(&self) -> &ToolLifecycleManager {
        &self.lifecycle
    }

    /// Returns the audit log.
    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditLog> {
        &self.audit
    }
}
