//! Filesystem-backed blob store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::blob::{Blob, BlobMeta, BlobStore, PutCondition, validate_key};
use crate::error::{StorageError, StorageResult};

/// Suffix of the sidecar file holding a blob's version.
pub const VERSION_SUFFIX: &str = ".version";

/// Blob store writing each key to a file under a root directory.
///
/// Payloads are written to a temporary file and renamed into place, so a
/// reader never observes a partial blob. Versions live in a sidecar file next
/// to the payload. Conditional writes are serialized within one process.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
    gate: RwLock<()>,
}

impl FsBlobStore {
    /// Opens (or creates) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while creating the root directory.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            gate: RwLock::new(()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn paths(&self, key: &str) -> StorageResult<(PathBuf, PathBuf)> {
        validate_key(key)?;
        let data = self.root.join(key);
        let mut version = data.clone().into_os_string();
        version.push(VERSION_SUFFIX);
        Ok((data, PathBuf::from(version)))
    }

    async fn read_version(key: &str, path: &Path) -> StorageResult<Option<u64>> {
        match fs::read_to_string(path).await {
            Ok(text) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| StorageError::corrupt(key, format!("bad version `{}`", text.trim()))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

async fn remove_if_present(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, condition: PutCondition) -> StorageResult<u64> {
        let (data_path, version_path) = self.paths(key)?;
        let _guard = self.gate.write().await;

        let current = Self::read_version(key, &version_path).await?;
        condition.check(key, current)?;
        let version = current.map_or(1, |version| version + 1);

        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut staging = data_path.clone().into_os_string();
        staging.push(format!(".{}.tmp", Uuid::new_v4()));
        let staging = PathBuf::from(staging);
        fs::write(&staging, &bytes).await?;
        fs::rename(&staging, &data_path).await?;
        fs::write(&version_path, version.to_string()).await?;
        Ok(version)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Blob>> {
        let (data_path, version_path) = self.paths(key)?;
        let _guard = self.gate.read().await;
        let Some(version) = Self::read_version(key, &version_path).await? else {
            return Ok(None);
        };
        match fs::read(&data_path).await {
            Ok(data) => Ok(Some(Blob {
                bytes: Bytes::from(data),
                version,
            })),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn head(&self, key: &str) -> StorageResult<Option<BlobMeta>> {
        let (data_path, version_path) = self.paths(key)?;
        let _guard = self.gate.read().await;
        let Some(version) = Self::read_version(key, &version_path).await? else {
            return Ok(None);
        };
        let metadata = match fs::metadata(&data_path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let updated_at = metadata
            .modified()
            .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
        Ok(Some(BlobMeta {
            version,
            size: usize::try_from(metadata.len()).unwrap_or(usize::MAX),
            updated_at,
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let (data_path, version_path) = self.paths(key)?;
        let _guard = self.gate.write().await;
        let existed = remove_if_present(&data_path).await?;
        remove_if_present(&version_path).await?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_nested_keys_and_tracks_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();

        let v1 = store
            .put("code/abc.py", Bytes::from_static(b"x = 1"), PutCondition::IfAbsent)
            .await
            .unwrap();
        assert_eq!(v1, 1);
        assert!(dir.path().join("code/abc.py").exists());

        let blob = store.get("code/abc.py").await.unwrap().unwrap();
        assert_eq!(blob.bytes, Bytes::from_static(b"x = 1"));
        assert_eq!(blob.version, 1);

        let v2 = store
            .put("code/abc.py", Bytes::from_static(b"x = 2"), PutCondition::IfVersion(1))
            .await
            .unwrap();
        assert_eq!(v2, 2);
        let meta = store.head("code/abc.py").await.unwrap().unwrap();
        assert_eq!(meta.version, 2);
        assert_eq!(meta.size, 5);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        store
            .put("k.json", Bytes::from_static(b"{}"), PutCondition::Always)
            .await
            .unwrap();
        store
            .put("k.json", Bytes::from_static(b"[]"), PutCondition::Always)
            .await
            .unwrap();
        let err = store
            .put("k.json", Bytes::from_static(b"1"), PutCondition::IfVersion(1))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn delete_removes_payload_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        store
            .put("a/b", Bytes::from_static(b"1"), PutCondition::Always)
            .await
            .unwrap();
        assert!(store.delete("a/b").await.unwrap());
        assert!(!store.exists("a/b").await.unwrap());
        assert!(!dir.path().join("a/b.version").exists());
        assert!(!store.delete("a/b").await.unwrap());
    }

    #[tokio::test]
    async fn missing_keys_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(dir.path()).await.unwrap();
        assert!(store.get("nothing/here").await.unwrap().is_none());
        assert!(store.head("nothing/here").await.unwrap().is_none());
    }
}
