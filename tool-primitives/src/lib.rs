//! Core shared types for the dynamic tool runtime.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod hash;
mod ids;
mod language;
mod outcome;
mod severity;

/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Content address derived from a language tag and trimmed source.
pub use hash::ContentHash;
/// Identifiers for agents and registered tools.
pub use ids::{AgentId, ToolId};
/// Languages accepted for tool submissions.
pub use language::Language;
/// Three-way result type for operations with best-effort side effects.
pub use outcome::Outcome;
/// Severity scale shared by findings and policy violations.
pub use severity::Severity;
