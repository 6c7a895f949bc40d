//! Register, update and deregister sagas.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tool_cache::{ArtifactCache, CachedArtifact, ExecutionMetadata};
use tool_primitives::{AgentId, ContentHash, Outcome, ToolId};
use tool_validation::{CacheMode, ValidationRequest, ValidationService};
use tracing::{debug, error, info, warn};

use crate::definition::ToolDefinition;
use crate::error::{LifecycleError, LifecycleResult, RegistrationError};
use crate::execution::{
    ExecutionBackend, ExecutionHandle, ExecutionReport, ExecutionRequest, wait_for,
};
use crate::gateway::ToolGateway;
use crate::index::{IndexError, ToolFilter, ToolIndex};
use crate::lifecycle::{StatusEvent, ToolStatus};
use crate::record::{ArtifactRef, ToolRecord, ToolStatusReport};

/// Interval between polls in [`ToolLifecycleManager::execute`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Per-call switches for [`ToolLifecycleManager::register`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOptions {
    /// Always analyze, even when an artifact for the hash is cached.
    #[serde(default)]
    pub skip_cache: bool,
}

/// What [`ToolLifecycleManager::deregister`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deregistration {
    /// Deregistered tool.
    pub tool_id: ToolId,
    /// Whether the record was deleted rather than deactivated.
    pub record_deleted: bool,
    /// Whether the cached artifact was deleted.
    pub artifact_deleted: bool,
    /// Status after deactivation; `None` when the record was deleted.
    pub status: Option<ToolStatus>,
}

/// Orchestrates validation, artifact storage, the tool index and the gateway.
///
/// Only the gateway publish during [`register`](Self::register) has a
/// compensating action: the freshly inserted record is deleted. Other gateway
/// and cache side effects degrade the outcome instead of failing it.
pub struct ToolLifecycleManager {
    validation: ValidationService,
    cache: ArtifactCache,
    index: Arc<dyn ToolIndex>,
    gateway: Arc<dyn ToolGateway>,
    execution: Option<Arc<dyn ExecutionBackend>>,
    execution_timeout: Option<u64>,
    poll_interval: Duration,
}

impl fmt::Debug for ToolLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolLifecycleManager")
            .field("validation", &self.validation)
            .field("cache", &self.cache)
            .field("index", &"dyn ToolIndex")
            .field("gateway", &"dyn ToolGateway")
            .field("execution", &self.execution.is_some())
            .field("execution_timeout", &self.execution_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl ToolLifecycleManager {
    /// Creates a manager without an execution backend.
    ///
    /// Submissions bypass any cache attached to `validation`; artifacts are
    /// read and written through `cache`.
    #[must_use]
    pub fn new(
        validation: ValidationService,
        cache: ArtifactCache,
        index: Arc<dyn ToolIndex>,
        gateway: Arc<dyn ToolGateway>,
    ) -> Self {
        Self {
            validation,
            cache,
            index,
            gateway,
            execution: None,
            execution_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Attaches an execution backend.
    #[must_use]
    pub fn with_execution_backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.execution = Some(backend);
        self
    }

    /// Overrides the timeout recorded on newly stored artifacts.
    #[must_use]
    pub fn with_execution_timeout(mut self, timeout_seconds: u64) -> Self {
        self.execution_timeout = Some(timeout_seconds);
        self
    }

    /// Overrides the interval used while waiting for executions.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns the validation service.
    #[must_use]
    pub fn validation(&self) -> &ValidationService {
        &self.validation
    }

    /// Returns the artifact cache.
    #[must_use]
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Validates, stores and publishes a new tool owned by `agent_id`.
    ///
    /// A cached artifact for the same content is re-admitted under the
    /// current policy instead of being analyzed again. If the gateway refuses
    /// the publish, the new record is deleted and
    /// [`RegistrationError::Publish`] is returned; the stored artifact is
    /// left in place.
    pub async fn register(
        &self,
        agent_id: AgentId,
        definition: &ToolDefinition,
        options: RegisterOptions,
    ) -> Outcome<ToolRecord, LifecycleError> {
        let mut reasons = Vec::new();
        let result = self
            .register_inner(agent_id, definition, options, &mut reasons)
            .await;
        finish(result, reasons)
    }

    /// Replaces the definition of a tool owned by `agent_id`.
    ///
    /// Unchanged content keeps the existing artifact. Changed content is
    /// resolved like a registration; the previous artifact is not touched.
    /// Gateway sync failures degrade the outcome.
    pub async fn update(
        &self,
        agent_id: AgentId,
        tool_id: ToolId,
        definition: &ToolDefinition,
    ) -> Outcome<ToolRecord, LifecycleError> {
        let mut reasons = Vec::new();
        let result = self
            .update_inner(agent_id, tool_id, definition, &mut reasons)
            .await;
        finish(result, reasons)
    }

    /// Withdraws a tool owned by `agent_id`.
    ///
    /// With `delete_artifact` the record is deleted and the artifact too,
    /// unless another record still references it. Otherwise the record is
    /// deactivated. Gateway and artifact deletion failures degrade the
    /// outcome.
    pub async fn deregister(
        &self,
        agent_id: AgentId,
        tool_id: ToolId,
        delete_artifact: bool,
    ) -> Outcome<Deregistration, LifecycleError> {
        let mut reasons = Vec::new();
        let result = self
            .deregister_inner(agent_id, tool_id, delete_artifact, &mut reasons)
            .await;
        finish(result, reasons)
    }

    /// Marks an active tool owned by `agent_id` as deprecated.
    pub async fn deprecate(
        &self,
        agent_id: AgentId,
        tool_id: ToolId,
    ) -> Outcome<ToolRecord, LifecycleError> {
        let mut reasons = Vec::new();
        let result = self
            .transition(agent_id, tool_id, StatusEvent::Deprecate)
            .await;
        let record = match result {
            Ok(record) => record,
            Err(err) => return Outcome::Failed(err),
        };
        self.sync(&record, &mut reasons).await;
        Outcome::from_parts(record, reasons)
    }

    /// Persisted status and counters. Touches neither the cache nor the
    /// gateway.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::ToolNotFound`] for unknown tools and
    /// index failures otherwise.
    pub async fn tool_status(&self, tool_id: ToolId) -> LifecycleResult<ToolStatusReport> {
        Ok(self.load(tool_id).await?.status_report())
    }

    /// Records one execution of `tool_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::ToolNotFound`] for unknown tools and
    /// index failures otherwise.
    pub async fn record_execution(&self, tool_id: ToolId) -> LifecycleResult<ToolRecord> {
        match self
            .index
            .increment_execution_count(tool_id, Utc::now())
            .await
        {
            Ok(record) => Ok(record),
            Err(IndexError::NotFound { .. }) => {
                Err(RegistrationError::ToolNotFound { tool_id }.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Submits the validated code of an active tool to the execution backend
    /// and records the execution.
    ///
    /// # Errors
    ///
    /// Fails when no backend is configured, the tool is missing or not
    /// active, its artifact is gone, or the backend refuses the submission.
    pub async fn submit_execution(
        &self,
        tool_id: ToolId,
        parameters: Value,
    ) -> LifecycleResult<ExecutionHandle> {
        let (handle, _) = self.start_execution(tool_id, parameters).await?;
        Ok(handle)
    }

    /// Submits an execution and waits for it to finish, cancelling it once
    /// the artifact's timeout elapses.
    ///
    /// # Errors
    ///
    /// Same as [`submit_execution`](Self::submit_execution), plus backend
    /// polling failures.
    pub async fn execute(&self, tool_id: ToolId, parameters: Value) -> LifecycleResult<ExecutionReport> {
        let backend = self.backend()?;
        let (handle, timeout) = self.start_execution(tool_id, parameters).await?;
        let report = wait_for(backend.as_ref(), &handle, timeout, self.poll_interval).await?;
        Ok(report)
    }

    /// Tools owned by `agent_id`.
    ///
    /// # Errors
    ///
    /// Propagates index failures.
    pub async fn find_by_agent(&self, agent_id: AgentId) -> LifecycleResult<Vec<ToolRecord>> {
        Ok(self.index.find_by_agent(agent_id).await?)
    }

    /// Active tools, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates index failures.
    pub async fn find_active(&self) -> LifecycleResult<Vec<ToolRecord>> {
        self.scan(&ToolFilter::new().with_status(ToolStatus::Active))
            .await
    }

    /// Tools matching `filter`, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates index failures.
    pub async fn scan(&self, filter: &ToolFilter) -> LifecycleResult<Vec<ToolRecord>> {
        Ok(self.index.scan(filter).await?)
    }

    async fn register_inner(
        &self,
        agent_id: AgentId,
        definition: &ToolDefinition,
        options: RegisterOptions,
        reasons: &mut Vec<String>,
    ) -> LifecycleResult<ToolRecord> {
        check_structure(definition)?;
        let artifact = self
            .resolve_artifact(definition, options.skip_cache, reasons)
            .await?;

        let record = self
            .index
            .insert(ToolRecord::new(agent_id, definition, artifact))
            .await?;
        let tool_id = record.tool_id;

        match self.gateway.publish(&record).await {
            Ok(ack) => {
                info!(
                    %tool_id,
                    %agent_id,
                    content_hash = %record.content_hash(),
                    endpoint = %ack.endpoint,
                    "tool registered"
                );
                Ok(record)
            }
            Err(source) => {
                warn!(%tool_id, error = %source, "publish failed; rolling back tool record");
                if let Err(err) = self.index.delete(tool_id).await {
                    error!(%tool_id, error = %err, "failed to roll back tool record");
                }
                Err(RegistrationError::Publish { tool_id, source }.into())
            }
        }
    }

    async fn update_inner(
        &self,
        agent_id: AgentId,
        tool_id: ToolId,
        definition: &ToolDefinition,
        reasons: &mut Vec<String>,
    ) -> LifecycleResult<ToolRecord> {
        let mut record = self.load(tool_id).await?;
        ensure_owner(&record, agent_id)?;
        check_structure(definition)?;

        let hash = definition.content_hash();
        let artifact = if hash == record.content_hash() {
            debug!(%tool_id, content_hash = %hash, "content unchanged; reusing artifact");
            record.artifact.clone()
        } else {
            self.resolve_artifact(definition, false, reasons).await?
        };

        let expected = record.revision;
        record.apply_definition(definition, artifact);
        let record = self.index.update(record, expected).await?;
        info!(%tool_id, version = %record.version, "tool updated");

        self.sync(&record, reasons).await;
        Ok(record)
    }

    async fn deregister_inner(
        &self,
        agent_id: AgentId,
        tool_id: ToolId,
        delete_artifact: bool,
        reasons: &mut Vec<String>,
    ) -> LifecycleResult<Deregistration> {
        let record = self.load(tool_id).await?;
        ensure_owner(&record, agent_id)?;
        let deactivated = if delete_artifact {
            None
        } else {
            Some(record.status.apply(tool_id, StatusEvent::Deactivate)?)
        };

        if let Err(err) = self.gateway.unpublish(tool_id, agent_id).await {
            warn!(%tool_id, error = %err, "gateway unpublish failed");
            reasons.push(format!("gateway unpublish failed: {err}"));
        }

        if let Some(status) = deactivated {
            let record = self
                .index
                .update_status(tool_id, status, record.revision)
                .await?;
            info!(%tool_id, "tool deactivated");
            return Ok(Deregistration {
                tool_id,
                record_deleted: false,
                artifact_deleted: false,
                status: Some(record.status),
            });
        }

        self.index.delete(tool_id).await?;
        let artifact_deleted = self.release_artifact(&record, reasons).await;
        info!(%tool_id, artifact_deleted, "tool deleted");
        Ok(Deregistration {
            tool_id,
            record_deleted: true,
            artifact_deleted,
            status: None,
        })
    }

    async fn release_artifact(&self, record: &ToolRecord, reasons: &mut Vec<String>) -> bool {
        let hash = record.content_hash();
        match self.index.find_by_content_hash(&hash).await {
            Ok(others) if !others.is_empty() => {
                debug!(
                    content_hash = %hash,
                    references = others.len(),
                    "artifact still referenced; keeping it"
                );
                false
            }
            Ok(_) => match self.cache.delete(&hash, record.language).await {
                Ok(deleted) => deleted,
                Err(err) => {
                    warn!(content_hash = %hash, error = %err, "artifact delete failed");
                    reasons.push(format!("artifact delete failed: {err}"));
                    false
                }
            },
            Err(err) => {
                warn!(content_hash = %hash, error = %err, "reference check failed; keeping artifact");
                reasons.push(format!("artifact reference check failed: {err}"));
                false
            }
        }
    }

    async fn transition(
        &self,
        agent_id: AgentId,
        tool_id: ToolId,
        event: StatusEvent,
    ) -> LifecycleResult<ToolRecord> {
        let record = self.load(tool_id).await?;
        ensure_owner(&record, agent_id)?;
        let status = record.status.apply(tool_id, event)?;
        Ok(self
            .index
            .update_status(tool_id, status, record.revision)
            .await?)
    }

    async fn resolve_artifact(
        &self,
        definition: &ToolDefinition,
        skip_cache: bool,
        reasons: &mut Vec<String>,
    ) -> LifecycleResult<ArtifactRef> {
        let hash = definition.content_hash();
        if !skip_cache {
            match self.cache.retrieve(&hash).await {
                Ok(Some(artifact)) => {
                    self.validation.readmit(artifact.validation)?;
                    self.bump_usage(&hash).await;
                    debug!(content_hash = %hash, "reusing cached artifact");
                    return Ok(ArtifactRef::new(hash));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(content_hash = %hash, error = %err, "cache read failed; treating as miss");
                    reasons.push(format!("cache read failed: {err}"));
                }
            }
        }

        let request = ValidationRequest::new(definition.language, definition.code.clone())
            .with_cache_mode(CacheMode::Bypass);
        let report = match self.validation.validate(&request).await {
            Outcome::Succeeded(report) => report,
            Outcome::Degraded {
                value,
                reasons: more,
            } => {
                reasons.extend(more);
                value
            }
            Outcome::Failed(err) => return Err(err.into()),
        };

        let mut execution = ExecutionMetadata::for_result(&report.result);
        if let Some(timeout) = self.execution_timeout {
            execution = execution.with_timeout(timeout);
        }
        let artifact = CachedArtifact::new(&definition.code, report.result, report.policy_id)
            .with_execution(execution);
        self.cache.store(&artifact).await?;
        debug!(content_hash = %hash, "artifact stored");
        Ok(ArtifactRef::new(hash))
    }

    async fn bump_usage(&self, hash: &ContentHash) {
        match self.cache.increment_usage(hash).await {
            Ok(Some(count)) => debug!(content_hash = %hash, usage_count = count, "artifact reused"),
            Ok(None) => debug!(content_hash = %hash, "artifact vanished before usage update"),
            Err(err) => warn!(content_hash = %hash, error = %err, "usage update failed"),
        }
    }

    async fn sync(&self, record: &ToolRecord, reasons: &mut Vec<String>) {
        if let Err(err) = self
            .gateway
            .sync_metadata(record.tool_id, &record.public_metadata())
            .await
        {
            warn!(tool_id = %record.tool_id, error = %err, "gateway metadata sync failed");
            reasons.push(format!("gateway sync failed: {err}"));
        }
    }

    async fn start_execution(
        &self,
        tool_id: ToolId,
        parameters: Value,
    ) -> LifecycleResult<(ExecutionHandle, Duration)> {
        let backend = self.backend()?;
        let record = self.load(tool_id).await?;
        if !record.status.is_active() {
            return Err(RegistrationError::ToolInactive {
                tool_id,
                status: record.status,
            }
            .into());
        }
        let hash = record.content_hash();
        let artifact = self
            .cache
            .retrieve(&hash)
            .await?
            .ok_or(RegistrationError::ArtifactMissing {
                tool_id,
                content_hash: hash,
            })?;

        let request = ExecutionRequest::new(
            tool_id,
            artifact.language,
            artifact.validated_code,
            parameters,
            &artifact.execution,
        );
        let timeout = request.timeout;
        let handle = backend.submit(request).await?;
        debug!(%tool_id, execution_id = %handle.execution_id, "execution submitted");

        if let Err(err) = self.record_execution(tool_id).await {
            warn!(%tool_id, error = %err, "failed to record execution");
        }
        Ok((handle, timeout))
    }

    fn backend(&self) -> Result<&Arc<dyn ExecutionBackend>, RegistrationError> {
        self.execution
            .as_ref()
            .ok_or(RegistrationError::ExecutionUnavailable)
    }

    async fn load(&self, tool_id: ToolId) -> LifecycleResult<ToolRecord> {
        self.index
            .get(tool_id)
            .await?
            .ok_or_else(|| RegistrationError::ToolNotFound { tool_id }.into())
    }
}

fn finish<T>(result: LifecycleResult<T>, reasons: Vec<String>) -> Outcome<T, LifecycleError> {
    match result {
        Ok(value) => Outcome::from_parts(value, reasons),
        Err(err) => Outcome::Failed(err),
    }
}

fn check_structure(definition: &ToolDefinition) -> Result<(), RegistrationError> {
    let errors = definition.validate_structure();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(RegistrationError::InvalidDefinition { errors })
    }
}

fn ensure_owner(record: &ToolRecord, agent_id: AgentId) -> Result<(), RegistrationError> {
    if record.is_owned_by(agent_id) {
        Ok(())
    } else {
        warn!(tool_id = %record.tool_id, %agent_id, "ownership check failed");
        Err(RegistrationError::NotOwner {
            tool_id: record.tool_id,
            agent_id,
            owner: record.agent_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;
    use tool_cache::MemoryBlobStore;
    use tool_policy::SecurityPolicy;
    use tool_primitives::Language;
    use tool_validation::ValidationError;
    use uuid::Uuid;

    use super::*;
    use crate::definition::{ParameterSchema, ReturnSchema, ToolSchema};
    use crate::execution::{ExecutionMetrics, ExecutionResult, ExecutionStatus};
    use crate::gateway::MemoryGateway;
    use crate::index::MemoryToolIndex;

    struct Harness {
        manager: ToolLifecycleManager,
        index: Arc<MemoryToolIndex>,
        gateway: Arc<MemoryGateway>,
        store: Arc<MemoryBlobStore>,
    }

    fn harness(policy: SecurityPolicy) -> Harness {
        let store = Arc::new(MemoryBlobStore::new());
        let index = Arc::new(MemoryToolIndex::new());
        let gateway = Arc::new(MemoryGateway::new());
        let manager = ToolLifecycleManager::new(
            ValidationService::new(Arc::new(policy)),
            ArtifactCache::new(store.clone()),
            index.clone(),
            gateway.clone(),
        );
        Harness {
            manager,
            index,
            gateway,
            store,
        }
    }

    fn definition(code: &str) -> ToolDefinition {
        ToolDefinition::new(
            "adder",
            "Adds two numbers",
            "1.0.0",
            Language::Python,
            code,
            ToolSchema::new(ReturnSchema::new("number", "Sum"))
                .with_parameter("a", ParameterSchema::new("number", "Left").required())
                .with_parameter("b", ParameterSchema::new("number", "Right").required()),
        )
    }

    const ADD: &str = "def add(a, b):\n    return a + b\n";

    #[tokio::test]
    async fn register_stores_indexes_and_publishes() {
        let h = harness(SecurityPolicy::strict());
        let owner = AgentId::random();
        let outcome = h
            .manager
            .register(owner, &definition(ADD), RegisterOptions::default())
            .await;
        assert!(!outcome.is_degraded());
        let record = outcome.into_result().unwrap();

        assert_eq!(record.status, ToolStatus::Active);
        assert_eq!(record.revision, 1);
        assert!(h.gateway.published(record.tool_id).await.is_some());
        let artifact = h
            .manager
            .cache()
            .retrieve(&record.content_hash())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(artifact.validated_code, ADD.trim());
        assert_eq!(artifact.usage_count, 0);
    }

    #[tokio::test]
    async fn second_registration_reuses_the_artifact() {
        let h = harness(SecurityPolicy::strict());
        let first = h
            .manager
            .register(AgentId::random(), &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();
        let second = h
            .manager
            .register(AgentId::random(), &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();
        assert_ne!(first.tool_id, second.tool_id);
        assert_eq!(first.content_hash(), second.content_hash());

        let artifact = h
            .manager
            .cache()
            .retrieve(&first.content_hash())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(artifact.usage_count, 1);
    }

    #[tokio::test]
    async fn structure_errors_fail_before_validation() {
        let h = harness(SecurityPolicy::strict());
        let mut bad = definition("");
        bad.name = String::new();
        let err = h
            .manager
            .register(AgentId::random(), &bad, RegisterOptions::default())
            .await
            .into_result()
            .unwrap_err();
        match err {
            LifecycleError::Registration(RegistrationError::InvalidDefinition { errors }) => {
                assert_eq!(errors, ["Tool name is required", "Tool code is required"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn rejected_code_is_not_registered() {
        let h = harness(SecurityPolicy::strict());
        let err = h
            .manager
            .register(
                AgentId::random(),
                &definition("import os\nos.system('ls')"),
                RegisterOptions::default(),
            )
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::Rejected { .. })
        ));
        assert!(h.index.is_empty().await);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn publish_failure_rolls_back_the_record() {
        let h = harness(SecurityPolicy::strict());
        h.gateway.set_available(false);
        let err = h
            .manager
            .register(AgentId::random(), &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap_err();
        let LifecycleError::Registration(RegistrationError::Publish { tool_id, .. }) = &err else {
            panic!("expected publish failure, got {err:?}");
        };
        assert!(h.index.is_empty().await);
        let status = h.manager.tool_status(*tool_id).await.unwrap_err();
        assert!(status.is_not_found());

        let hash = definition(ADD).content_hash();
        assert!(h.manager.cache().exists(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn update_checks_ownership_and_reuses_unchanged_artifacts() {
        let h = harness(SecurityPolicy::strict());
        let owner = AgentId::random();
        let record = h
            .manager
            .register(owner, &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();

        let mut next = definition(ADD);
        next.version = "1.1.0".into();
        let err = h
            .manager
            .update(AgentId::random(), record.tool_id, &next)
            .await
            .into_result()
            .unwrap_err();
        assert!(err.is_not_owner());
        let untouched = h.index.get(record.tool_id).await.unwrap().unwrap();
        assert_eq!(untouched, record);

        let updated = h
            .manager
            .update(owner, record.tool_id, &next)
            .await
            .into_result()
            .unwrap();
        assert_eq!(updated.version, "1.1.0");
        assert_eq!(updated.artifact, record.artifact);
        assert_eq!(updated.revision, record.revision + 1);
        assert_eq!(
            h.gateway.published(record.tool_id).await.unwrap().version,
            "1.1.0"
        );
    }

    #[tokio::test]
    async fn update_with_new_code_keeps_the_old_artifact() {
        let h = harness(SecurityPolicy::strict());
        let owner = AgentId::random();
        let record = h
            .manager
            .register(owner, &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();

        h.gateway.set_available(false);
        let outcome = h
            .manager
            .update(owner, record.tool_id, &definition("def add(a, b):\n    return b + a\n"))
            .await;
        assert!(outcome.is_degraded());
        assert!(outcome.reasons()[0].starts_with("gateway sync failed"));
        let updated = outcome.into_result().unwrap();
        assert_ne!(updated.content_hash(), record.content_hash());

        let cache = h.manager.cache();
        assert!(cache.exists(&record.content_hash()).await.unwrap());
        assert!(cache.exists(&updated.content_hash()).await.unwrap());
    }

    #[tokio::test]
    async fn deregister_without_delete_deactivates() {
        let h = harness(SecurityPolicy::strict());
        let owner = AgentId::random();
        let record = h
            .manager
            .register(owner, &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();

        let gone = h
            .manager
            .deregister(owner, record.tool_id, false)
            .await
            .into_result()
            .unwrap();
        assert_eq!(gone.status, Some(ToolStatus::Inactive));
        assert!(!gone.record_deleted);
        assert!(h.gateway.is_empty().await);

        let status = h.manager.tool_status(record.tool_id).await.unwrap();
        assert_eq!(status.status, ToolStatus::Inactive);
        assert!(h.manager.find_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn shared_artifacts_survive_until_the_last_reference() {
        let h = harness(SecurityPolicy::strict());
        let (alice, bob) = (AgentId::random(), AgentId::random());
        let first = h
            .manager
            .register(alice, &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();
        let second = h
            .manager
            .register(bob, &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();
        let hash = first.content_hash();

        let outcome = h
            .manager
            .deregister(alice, first.tool_id, true)
            .await
            .into_result()
            .unwrap();
        assert!(outcome.record_deleted);
        assert!(!outcome.artifact_deleted);
        assert!(h.manager.cache().exists(&hash).await.unwrap());

        let outcome = h
            .manager
            .deregister(bob, second.tool_id, true)
            .await
            .into_result()
            .unwrap();
        assert!(outcome.artifact_deleted);
        assert!(!h.manager.cache().exists(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn deregister_degrades_when_gateway_is_down() {
        let h = harness(SecurityPolicy::strict());
        let owner = AgentId::random();
        let record = h
            .manager
            .register(owner, &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();
        h.gateway.set_available(false);
        let outcome = h.manager.deregister(owner, record.tool_id, true).await;
        assert!(outcome.is_degraded());
        assert!(h.index.is_empty().await);
    }

    #[tokio::test]
    async fn deprecate_follows_the_status_machine() {
        let h = harness(SecurityPolicy::strict());
        let owner = AgentId::random();
        let record = h
            .manager
            .register(owner, &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();

        let deprecated = h
            .manager
            .deprecate(owner, record.tool_id)
            .await
            .into_result()
            .unwrap();
        assert_eq!(deprecated.status, ToolStatus::Deprecated);

        let err = h
            .manager
            .deprecate(owner, record.tool_id)
            .await
            .into_result()
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Registration(RegistrationError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn deprecated_tools_deactivate_and_leave_the_gateway() {
        let h = harness(SecurityPolicy::strict());
        let owner = AgentId::random();
        let record = h
            .manager
            .register(owner, &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();
        h.manager
            .deprecate(owner, record.tool_id)
            .await
            .into_result()
            .unwrap();

        let outcome = h
            .manager
            .deregister(owner, record.tool_id, false)
            .await
            .into_result()
            .unwrap();
        assert_eq!(outcome.status, Some(ToolStatus::Inactive));
        assert!(h.gateway.published(record.tool_id).await.is_none());
        let stored = h.index.get(record.tool_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ToolStatus::Inactive);
    }

    #[derive(Default)]
    struct Immediate {
        submitted: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionBackend for Immediate {
        async fn submit(&self, request: ExecutionRequest) -> ExecutionResult<ExecutionHandle> {
            assert!(request.code.starts_with("def add"));
            self.submitted.fetch_add(1, Ordering::AcqRel);
            Ok(ExecutionHandle {
                execution_id: Uuid::new_v4(),
                tool_id: request.tool_id,
            })
        }

        async fn poll(&self, handle: &ExecutionHandle) -> ExecutionResult<ExecutionReport> {
            Ok(ExecutionReport {
                handle: *handle,
                status: ExecutionStatus::Success,
                output: Some(json!(3)),
                error: None,
                metrics: ExecutionMetrics::default(),
            })
        }

        async fn cancel(&self, _handle: &ExecutionHandle) -> ExecutionResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn executions_are_submitted_and_counted() {
        let store = Arc::new(MemoryBlobStore::new());
        let backend = Arc::new(Immediate::default());
        let manager = ToolLifecycleManager::new(
            ValidationService::new(Arc::new(SecurityPolicy::strict())),
            ArtifactCache::new(store),
            Arc::new(MemoryToolIndex::new()),
            Arc::new(MemoryGateway::new()),
        )
        .with_execution_backend(backend.clone())
        .with_poll_interval(Duration::from_millis(1));

        let owner = AgentId::random();
        let record = manager
            .register(owner, &definition(ADD), RegisterOptions::default())
            .await
            .into_result()
            .unwrap();

        let report = manager
            .execute(record.tool_id, json!({"a": 1, "b": 2}))
            .await
            .unwrap();
        assert_eq!(report.status, ExecutionStatus::Success);
        assert_eq!(report.output, Some(json!(3)));

        let status = manager.tool_status(record.tool_id).await.unwrap();
        assert_eq!(status.execution_count, 1);
        assert!(status.last_executed.is_some());

        manager
            .deregister(owner, record.tool_id, false)
            .await
            .into_result()
            .unwrap();
        let err = manager
            .submit_execution(record.tool_id, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Registration(RegistrationError::ToolInactive { .. })
        ));
        assert_eq!(backend.submitted.load(Ordering::Acquire), 1);
    }

    #[tokio::test]
    async fn execution_requires_a_backend() {
        let h = harness(SecurityPolicy::strict());
        let err = h
            .manager
            .submit_execution(ToolId::random(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Registration(RegistrationError::ExecutionUnavailable)
        ));
    }
}
