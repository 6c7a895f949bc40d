//! Versioned blob storage with conditional writes.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};

/// Precondition attached to a [`BlobStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutCondition {
    /// Write unconditionally.
    Always,
    /// Write only if no blob exists under the key.
    IfAbsent,
    /// Write only if the stored blob currently has this version.
    IfVersion(u64),
}

impl PutCondition {
    /// Checks the condition against the version currently stored, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] when the precondition does not hold.
    pub fn check(self, key: &str, current: Option<u64>) -> StorageResult<()> {
        match (self, current) {
            (Self::Always, _) | (Self::IfAbsent, None) => Ok(()),
            (Self::IfAbsent, Some(_)) => Err(StorageError::conflict(key, "blob already exists")),
            (Self::IfVersion(expected), Some(actual)) if expected == actual => Ok(()),
            (Self::IfVersion(expected), Some(actual)) => Err(StorageError::conflict(
                key,
                format!("expected version {expected}, found {actual}"),
            )),
            (Self::IfVersion(expected), None) => Err(StorageError::conflict(
                key,
                format!("expected version {expected}, blob is absent"),
            )),
        }
    }
}

/// Metadata describing a stored blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobMeta {
    /// Monotonic version, starting at 1 for the first write of a key.
    pub version: u64,
    /// Payload length in bytes.
    pub size: usize,
    /// Time of the most recent write.
    pub updated_at: DateTime<Utc>,
}

/// Payload together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Stored bytes.
    pub bytes: Bytes,
    /// Version the bytes were read at.
    pub version: u64,
}

/// Key/value store for opaque payloads.
///
/// Every write bumps the key's version; conditional writes give
/// at-most-one-writer semantics per key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key` if `condition` holds, returning the new version.
    async fn put(&self, key: &str, bytes: Bytes, condition: PutCondition) -> StorageResult<u64>;

    /// Reads a blob; a missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> StorageResult<Option<Blob>>;

    /// Reads blob metadata without the payload.
    async fn head(&self, key: &str) -> StorageResult<Option<BlobMeta>>;

    /// Returns `true` if a blob exists under `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.head(key).await?.is_some())
    }

    /// Removes a blob, returning whether it existed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;
}

/// Rejects keys that could escape a store root or collide with sidecar files.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] describing the first problem found.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = |reason| {
        Err(StorageError::InvalidKey {
            key: key.to_owned(),
            reason,
        })
    };
    if key.is_empty() {
        return invalid("key is empty");
    }
    if key.starts_with('/') || key.contains('\\') {
        return invalid("key must be a relative forward-slash path");
    }
    if key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return invalid("key contains an empty or relative segment");
    }
    if key.ends_with(crate::fs::VERSION_SUFFIX) {
        return invalid("key uses a reserved suffix");
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Bytes,
    version: u64,
    updated_at: DateTime<Utc>,
}

/// Process-local blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored blobs.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns every stored key, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, condition: PutCondition) -> StorageResult<u64> {
        validate_key(key)?;
        let mut guard = self.entries.write().await;
        let current = guard.get(key).map(|stored| stored.version);
        condition.check(key, current)?;
        let version = current.map_or(1, |version| version + 1);
        guard.insert(
            key.to_owned(),
            StoredBlob {
                bytes,
                version,
                updated_at: Utc::now(),
            },
        );
        Ok(version)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Blob>> {
        validate_key(key)?;
        Ok(self.entries.read().await.get(key).map(|stored| Blob {
            bytes: stored.bytes.clone(),
            version: stored.version,
        }))
    }

    async fn head(&self, key: &str) -> StorageResult<Option<BlobMeta>> {
        validate_key(key)?;
        Ok(self.entries.read().await.get(key).map(|stored| BlobMeta {
            version: stored.version,
            size: stored.bytes.len(),
            updated_at: stored.updated_at,
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
