//! Content-addressed storage for validated tool artifacts.
//!
//! [`ArtifactCache`] layers artifact records, raw source and policy
//! snapshots over any [`BlobStore`]. [`AuditLog`] implementations record
//! what was validated, invalidated and stored.

#![warn(missing_docs, clippy::pedantic)]

pub mod artifact;
pub mod audit;
pub mod blob;
pub mod cache;
pub mod error;
pub mod fs;

pub use artifact::{CachedArtifact, DEFAULT_TIMEOUT_SECONDS, ExecutionMetadata};
pub use audit::{AuditAction, AuditEntry, AuditLog, FileAuditLog, MemoryAuditLog};
pub use blob::{Blob, BlobMeta, BlobStore, MemoryBlobStore, PutCondition};
pub use cache::{ArtifactCache, artifact_key, code_key, policy_key};
pub use error::{StorageError, StorageResult};
pub use fs::FsBlobStore;
