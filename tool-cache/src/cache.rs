//! Content-addressed artifact cache over a [`BlobStore`].

use std::sync::Arc;

use bytes::Bytes;
use tool_policy::SecurityPolicy;
use tool_primitives::{ContentHash, Language};
use tracing::{debug, warn};

use crate::artifact::CachedArtifact;
use crate::blob::{BlobStore, PutCondition};
use crate::error::{StorageError, StorageResult};

/// Conditional-write attempts made by [`ArtifactCache::store`] and
/// [`ArtifactCache::increment_usage`].
pub const DEFAULT_USAGE_RETRIES: u32 = 8;

/// Key of an artifact's metadata record.
#[must_use]
pub fn artifact_key(hash: &ContentHash) -> String {
    format!("artifacts/{hash}.json")
}

/// Key of an artifact's raw source.
#[must_use]
pub fn code_key(hash: &ContentHash, language: Language) -> String {
    format!("code/{hash}.{}", language.extension())
}

/// Key of a policy snapshot.
#[must_use]
pub fn policy_key(policy: &SecurityPolicy) -> String {
    format!("policies/{}-{}.json", policy.id(), policy.version())
}

/// Stores validated artifacts keyed by content hash.
///
/// The cache never decides whether an artifact may be deleted; callers check
/// that no tool record still references the hash.
#[derive(Clone)]
pub struct ArtifactCache {
    store: Arc<dyn BlobStore>,
    usage_retries: u32,
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCache")
            .field("usage_retries", &self.usage_retries)
            .finish_non_exhaustive()
    }
}

impl ArtifactCache {
    /// Creates a cache over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            usage_retries: DEFAULT_USAGE_RETRIES,
        }
    }

    /// Overrides the number of conditional-write attempts for usage counters.
    #[must_use]
    pub fn with_usage_retries(mut self, attempts: u32) -> Self {
        self.usage_retries = attempts.max(1);
        self
    }

    /// Returns the backing store.
    #[must_use]
    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Writes the raw source, then the metadata record.
    ///
    /// Rewriting an existing artifact keeps its `usage_count` and
    /// `created_at`; the record is replaced conditionally on the version read,
    /// so a concurrent usage increment is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Contended`] after exhausting retries, and
    /// propagates serialization and blob store failures.
    pub async fn store(&self, artifact: &CachedArtifact) -> StorageResult<()> {
        let hash = &artifact.content_hash;
        self.store
            .put(
                &code_key(hash, artifact.language),
                Bytes::from(artifact.validated_code.clone()),
                PutCondition::Always,
            )
            .await?;

        let key = artifact_key(hash);
        for attempt in 1..=self.usage_retries {
            let mut merged = artifact.clone();
            let condition = match self.store.get(&key).await? {
                Some(blob) => {
                    match decode(&key, hash, &blob.bytes) {
                        Ok(previous) => {
                            merged.usage_count = merged.usage_count.max(previous.usage_count);
                            merged.created_at = previous.created_at;
                        }
                        Err(err) => {
                            warn!(content_hash = %hash, error = %err, "replacing unreadable record");
                        }
                    }
                    PutCondition::IfVersion(blob.version)
                }
                None => PutCondition::IfAbsent,
            };
            let record = serde_json::to_vec(&merged)?;
            match self.store.put(&key, Bytes::from(record), condition).await {
                Ok(_) => {
                    debug!(
                        content_hash = %hash,
                        language = %artifact.language,
                        usage_count = merged.usage_count,
                        "artifact stored"
                    );
                    return Ok(());
                }
                Err(err) if err.is_conflict() => {
                    debug!(content_hash = %hash, attempt, "artifact write lost a race; retrying");
                }
                Err(err) => return Err(err),
            }
        }
        warn!(content_hash = %hash, attempts = self.usage_retries, "artifact write abandoned");
        Err(StorageError::Contended {
            key,
            attempts: self.usage_retries,
        })
    }

    /// Reads an artifact; a miss is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Propagates blob store failures and returns [`StorageError::Corrupt`]
    /// when the record does not describe `hash`.
    pub async fn retrieve(&self, hash: &ContentHash) -> StorageResult<Option<CachedArtifact>> {
        let key = artifact_key(hash);
        let Some(blob) = self.store.get(&key).await? else {
            return Ok(None);
        };
        decode(&key, hash, &blob.bytes).map(Some)
    }

    /// Reads the raw source stored for `hash`.
    ///
    /// # Errors
    ///
    /// Propagates blob store failures and returns [`StorageError::Corrupt`]
    /// for non UTF-8 payloads.
    pub async fn retrieve_code(
        &self,
        hash: &ContentHash,
        language: Language,
    ) -> StorageResult<Option<String>> {
        let key = code_key(hash, language);
        let Some(blob) = self.store.get(&key).await? else {
            return Ok(None);
        };
        String::from_utf8(blob.bytes.to_vec())
            .map(Some)
            .map_err(|err| StorageError::corrupt(key, err.to_string()))
    }

    /// Returns `true` if a metadata record exists for `hash`.
    ///
    /// # Errors
    ///
    /// Propagates blob store failures.
    pub async fn exists(&self, hash: &ContentHash) -> StorageResult<bool> {
        self.store.exists(&artifact_key(hash)).await
    }

    /// Increments the usage counter, returning the new count, or `None` when
    /// the artifact is absent.
    ///
    /// Each attempt writes conditionally on the version it read, so concurrent
    /// increments are never lost.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Contended`] after exhausting retries, and
    /// propagates other blob store failures.
    pub async fn increment_usage(&self, hash: &ContentHash) -> StorageResult<Option<u64>> {
        let key = artifact_key(hash);
        for attempt in 1..=self.usage_retries {
            let Some(blob) = self.store.get(&key).await? else {
                return Ok(None);
            };
            let mut artifact = decode(&key, hash, &blob.bytes)?;
            artifact.usage_count += 1;
            let record = serde_json::to_vec(&artifact)?;
            match self
                .store
                .put(&key, Bytes::from(record), PutCondition::IfVersion(blob.version))
                .await
            {
                Ok(_) => return Ok(Some(artifact.usage_count)),
                Err(err) if err.is_conflict() => {
                    debug!(content_hash = %hash, attempt, "usage increment lost a race; retrying");
                }
                Err(err) => return Err(err),
            }
        }
        warn!(content_hash = %hash, attempts = self.usage_retries, "usage increment abandoned");
        Err(StorageError::Contended {
            key,
            attempts: self.usage_retries,
        })
    }

    /// Removes the metadata record and the raw source, returning whether a
    /// record existed.
    ///
    /// # Errors
    ///
    /// Propagates blob store failures.
    pub async fn delete(&self, hash: &ContentHash, language: Language) -> StorageResult<bool> {
        let existed = self.store.delete(&artifact_key(hash)).await?;
        self.store.delete(&code_key(hash, language)).await?;
        debug!(content_hash = %hash, existed, "artifact deleted");
        Ok(existed)
    }

    /// Writes a policy snapshot, returning its key.
    ///
    /// # Errors
    ///
    /// Propagates serialization and blob store failures.
    pub async fn store_policy(&self, policy: &SecurityPolicy) -> StorageResult<String> {
        let key = policy_key(policy);
        let document = serde_json::to_vec_pretty(policy)?;
        self.store
            .put(&key, Bytes::from(document), PutCondition::Always)
            .await?;
        debug!(policy = policy.id(), version = policy.version(), "policy snapshot stored");
        Ok(key)
    }
}

fn decode(key: &str, hash: &ContentHash, bytes: &[u8]) -> StorageResult<CachedArtifact> {
    let artifact: CachedArtifact = serde_json::from_slice(bytes)?;
    if artifact.content_hash != *hash {
        return Err(StorageError::corrupt(
            key,
            format!("record describes {}", artifact.content_hash),
        ));
    }
    Ok(artifact)
}
