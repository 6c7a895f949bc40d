//! Dynamic tool runtime facade.
//!
//! Agents submit Python or JavaScript/TypeScript source; the runtime analyzes
//! it, gates it against a security policy, caches the validated artifact by
//! content hash and manages the resulting tool records. This crate bundles
//! the component crates; `config` and `telemetry` are optional features.

#![warn(missing_docs, clippy::pedantic)]

/// Shared identifiers, hashes and outcomes.
pub use tool_primitives as primitives;

/// Static analyzers and the security linter seam.
pub use tool_analysis as analysis;

/// Security policies and the policy evaluator.
pub use tool_policy as policy;

/// Content-addressed artifact cache and audit log.
pub use tool_cache as cache;

/// Validation service.
pub use tool_validation as validation;

/// Tool records and lifecycle sagas.
pub use tool_lifecycle as lifecycle;

/// Configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use tool_config as config;

/// Tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use tool_telemetry as telemetry;

#[cfg(feature = "config")]
mod runtime;

#[cfg(feature = "config")]
pub use runtime::Runtime;
