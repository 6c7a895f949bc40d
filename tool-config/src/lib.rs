//! Configuration management for the dynamic tool runtime.
//!
//! Settings come from an optional TOML file, then `DYNTOOLS_*` environment
//! variables, and are validated before use.

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use loader::{ConfigLoader, ENV_PREFIX, apply_overrides, from_toml_str};
pub use schema::{
    AuditConfig, CacheBackend, CacheConfig, ExecutionConfig, LinterConfig, LoggingConfig,
    PolicyConfig, PolicyPreset, RuntimeConfig,
};
