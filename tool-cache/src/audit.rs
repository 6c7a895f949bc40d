//! Audit trail of validation and cache events.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tool_primitives::{ContentHash, Language};

use crate::error::StorageResult;

/// Event recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A submission was analyzed and its result cached.
    Validated,
    /// A cached result was removed.
    Invalidated,
    /// A policy snapshot was written.
    PolicyStored,
}

/// One audit trail line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// What happened.
    pub action: AuditAction,
    /// Content hash the event concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<ContentHash>,
    /// Submission language, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// Policy in force (or stored).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    /// Whether the submission was valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    /// Whether the submission had critical findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_critical_issues: Option<bool>,
    /// When the event was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    fn new(action: AuditAction) -> Self {
        Self {
            action,
            content_hash: None,
            language: None,
            policy_id: None,
            is_valid: None,
            has_critical_issues: None,
            recorded_at: Utc::now(),
        }
    }

    /// Entry for a freshly analyzed and cached submission.
    #[must_use]
    pub fn validated(
        content_hash: ContentHash,
        language: Language,
        policy_id: impl Into<String>,
        is_valid: bool,
        has_critical_issues: bool,
    ) -> Self {
        Self {
            content_hash: Some(content_hash),
            language: Some(language),
            policy_id: Some(policy_id.into()),
            is_valid: Some(is_valid),
            has_critical_issues: Some(has_critical_issues),
            ..Self::new(AuditAction::Validated)
        }
    }

    /// Entry for an explicit cache invalidation.
    #[must_use]
    pub fn invalidated(content_hash: ContentHash, language: Language) -> Self {
        Self {
            content_hash: Some(content_hash),
            language: Some(language),
            ..Self::new(AuditAction::Invalidated)
        }
    }

    /// Entry for a stored policy snapshot.
    #[must_use]
    pub fn policy_stored(policy_id: impl Into<String>) -> Self {
        Self {
            policy_id: Some(policy_id.into()),
            ..Self::new(AuditAction::PolicyStored)
        }
    }
}

/// Append-only audit sink.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Appends an entry.
    async fn record(&self, entry: &AuditEntry) -> StorageResult<()>;

    /// Returns the most recent `limit` entries, ordered oldest to newest.
    async fn recent(&self, limit: usize) -> StorageResult<Vec<AuditEntry>>;
}

/// File-backed audit log writing newline-delimited JSON entries.
pub struct FileAuditLog {
    path: PathBuf,
    file: Mutex<fs::File>,
}

impl FileAuditLog {
    /// Opens (or creates) an audit log at the provided path.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while preparing the file.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the underlying path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncates the log.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying file.
    pub async fn clear(&self) -> StorageResult<()> {
        let mut guard = self.file.lock().await;
        guard.rewind().await?;
        guard.set_len(0).await?;
        guard.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    async fn record(&self, entry: &AuditEntry) -> StorageResult<()> {
        let line = serde_json::to_vec(entry)?;
        let mut guard = self.file.lock().await;
        guard.write_all(&line).await?;
        guard.write_u8(b'\n').await?;
        guard.flush().await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StorageResult<Vec<AuditEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let data = fs::read(&self.path).await?;
        let mut entries = Vec::new();
        for chunk in data
            .split(|byte| *byte == b'\n')
            .filter(|chunk| !chunk.is_empty())
        {
            entries.push(serde_json::from_slice::<AuditEntry>(chunk)?);
        }

        let skip = entries.len().saturating_sub(limit);
        Ok(entries.into_iter().skip(skip).collect())
    }
}

/// In-memory audit log retaining the most recent entries.
#[derive(Debug)]
pub struct MemoryAuditLog {
    capacity: NonZeroUsize,
    entries: RwLock<VecDeque<AuditEntry>>,
}

impl MemoryAuditLog {
    /// Creates a log holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity.get())),
        }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Number of retained entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(1024).expect("non-zero"))
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(&self, entry: &AuditEntry) -> StorageResult<()> {
        let mut guard = self.entries.write().await;
        guard.push_back(entry.clone());
        while guard.len() > self.capacity.get() {
            guard.pop_front();
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> StorageResult<Vec<AuditEntry>> {
        let guard = self.entries.read().await;
        let skip = guard.len().saturating_sub(limit);
        Ok(guard.iter().skip(skip).cloned().collect())
    }
}
