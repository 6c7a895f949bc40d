//! Persistent index of tool records.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tool_primitives::{AgentId, ContentHash, Language, ToolId};

use crate::lifecycle::ToolStatus;
use crate::record::ToolRecord;

/// Result alias for tool index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors surfaced by [`ToolIndex`] implementations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Stored revision did not match the caller's expectation.
    #[error("revision conflict on tool {tool_id}: expected {expected}, found {actual}")]
    Conflict {
        /// Tool whose record changed concurrently.
        tool_id: ToolId,
        /// Revision the caller read.
        expected: u64,
        /// Revision currently stored.
        actual: u64,
    },
    /// A record with this identifier already exists.
    #[error("tool {tool_id} already exists")]
    AlreadyExists {
        /// Conflicting identifier.
        tool_id: ToolId,
    },
    /// No record exists for this identifier.
    #[error("tool {tool_id} not found in index")]
    NotFound {
        /// Missing identifier.
        tool_id: ToolId,
    },
    /// Backend failure.
    #[error("tool index backend error: {reason}")]
    Backend {
        /// Human-readable context provided by the backend.
        reason: String,
    },
}

impl IndexError {
    /// Convenience helper to construct backend errors.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Query over tool records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFilter {
    agent_id: Option<AgentId>,
    status: Option<ToolStatus>,
    language: Option<Language>,
    name_contains: Option<String>,
    limit: Option<usize>,
}

impl ToolFilter {
    /// Filter matching every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one owner.
    #[must_use]
    pub fn with_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Restricts to one status.
    #[must_use]
    pub fn with_status(mut self, status: ToolStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to one language.
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Restricts to names containing `needle`, case-insensitively.
    #[must_use]
    pub fn with_name_containing(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into().to_lowercase());
        self
    }

    /// Caps the number of returned records.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the result cap, if any.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns `true` when `record` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, record: &ToolRecord) -> bool {
        self.agent_id.is_none_or(|agent| record.agent_id == agent)
            && self.status.is_none_or(|status| record.status == status)
            && self.language.is_none_or(|language| record.language == language)
            && self
                .name_contains
                .as_deref()
                .is_none_or(|needle| record.name.to_lowercase().contains(needle))
    }
}

/// Storage for [`ToolRecord`]s.
///
/// Every mutation bumps `revision`; callers pass the revision they read so
/// concurrent writers cannot overwrite each other.
#[async_trait]
pub trait ToolIndex: Send + Sync {
    /// Loads one record.
    async fn get(&self, tool_id: ToolId) -> IndexResult<Option<ToolRecord>>;

    /// Inserts a record if its identifier is unused, returning the stored copy.
    async fn insert(&self, record: ToolRecord) -> IndexResult<ToolRecord>;

    /// Replaces a record if its stored revision equals `expected_revision`.
    async fn update(&self, record: ToolRecord, expected_revision: u64) -> IndexResult<ToolRecord>;

    /// Sets the status if the stored revision equals `expected_revision`.
    async fn update_status(
        &self,
        tool_id: ToolId,
        status: ToolStatus,
        expected_revision: u64,
    ) -> IndexResult<ToolRecord>;

    /// Removes a record, returning whether it existed.
    async fn delete(&self, tool_id: ToolId) -> IndexResult<bool>;

    /// Records owned by `agent_id`.
    async fn find_by_agent(&self, agent_id: AgentId) -> IndexResult<Vec<ToolRecord>>;

    /// Records referencing the artifact for `hash`.
    async fn find_by_content_hash(&self, hash: &ContentHash) -> IndexResult<Vec<ToolRecord>>;

    /// Records matching `filter`, oldest first.
    async fn scan(&self, filter: &ToolFilter) -> IndexResult<Vec<ToolRecord>>;

    /// Atomically increments the execution counter and sets `last_executed`.
    async fn increment_execution_count(
        &self,
        tool_id: ToolId,
        at: DateTime<Utc>,
    ) -> IndexResult<ToolRecord>;
}

/// In-process [`ToolIndex`].
#[derive(Debug, Default)]
pub struct MemoryToolIndex {
    records: RwLock<HashMap<ToolId, ToolRecord>>,
}

impl MemoryToolIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` when no record is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn select(&self, predicate: impl Fn(&ToolRecord) -> bool) -> Vec<ToolRecord> {
        let guard = self.records.read().await;
        let mut records: Vec<ToolRecord> = guard
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.tool_id.cmp(&b.tool_id))
        });
        records
    }
}

fn check_revision(tool_id: ToolId, stored: &ToolRecord, expected: u64) -> IndexResult<()> {
    if stored.revision == expected {
        Ok(())
    } else {
        Err(IndexError::Conflict {
            tool_id,
            expected,
            actual: stored.revision,
        })
    }
}

#[async_trait]
impl ToolIndex for MemoryToolIndex {
    async fn get(&self, tool_id: ToolId) -> IndexResult<Option<ToolRecord>> {
        Ok(self.records.read().await.get(&tool_id).cloned())
    }

    async fn insert(&self, mut record: ToolRecord) -> IndexResult<ToolRecord> {
        let mut guard = self.records.write().await;
        if guard.contains_key(&record.tool_id) {
            return Err(IndexError::AlreadyExists {
                tool_id: record.tool_id,
            });
        }
        record.revision = 1;
        guard.insert(record.tool_id, record.clone());
        Ok(record)
    }

    async fn update(&self, mut record: ToolRecord, expected_revision: u64) -> IndexResult<ToolRecord> {
        let tool_id = record.tool_id;
        let mut guard = self.records.write().await;
        let stored = guard
            .get_mut(&tool_id)
            .ok_or(IndexError::NotFound { tool_id })?;
        check_revision(tool_id, stored, expected_revision)?;
        record.revision = expected_revision + 1;
        *stored = record.clone();
        Ok(record)
    }

    async fn update_status(
        &self,
        tool_id: ToolId,
        status: ToolStatus,
        expected_revision: u64,
    ) -> IndexResult<ToolRecord> {
        let mut guard = self.records.write().await;
        let stored = guard
            .get_mut(&tool_id)
            .ok_or(IndexError::NotFound { tool_id })?;
        check_revision(tool_id, stored, expected_revision)?;
        stored.status = status;
        stored.updated_at = Utc::now();
        stored.revision += 1;
        Ok(stored.clone())
    }

    async fn delete(&self, tool_id: ToolId) -> IndexResult<bool> {
        Ok(self.records.write().await.remove(&tool_id).is_some())
    }

    async fn find_by_agent(&self, agent_id: AgentId) -> IndexResult<Vec<ToolRecord>> {
        Ok(self.select(|record| record.agent_id == agent_id).await)
    }

    async fn find_by_content_hash(&self, hash: &ContentHash) -> IndexResult<Vec<ToolRecord>> {
        Ok(self.select(|record| record.content_hash() == *hash).await)
    }

    async fn scan(&self, filter: &ToolFilter) -> IndexResult<Vec<ToolRecord>> {
        let mut records = self.select(|record| filter.matches(record)).await;
        if let Some(limit) = filter.limit() {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn increment_execution_count(
        &self,
        tool_id: ToolId,
        at: DateTime<Utc>,
    ) -> IndexResult<ToolRecord> {
        let mut guard = self.records.write().await;
        let stored = guard
            .get_mut(&tool_id)
            .ok_or(IndexError::NotFound { tool_id })?;
        stored.execution_count += 1;
        stored.last_executed = Some(at);
        stored.revision += 1;
        Ok(stored.clone())
    }
}
