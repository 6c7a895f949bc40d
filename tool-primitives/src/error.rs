//! Shared error definitions for tool primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the tool runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided identifier could not be parsed.
    #[error("invalid {kind} id: {source}")]
    InvalidId {
        /// Which identifier family failed to parse (`agent`, `tool`).
        kind: &'static str,
        /// Source parsing error from the UUID library.
        source: UuidError,
    },

    /// The language tag is not one of the supported submission languages.
    #[error("unsupported language `{language}`")]
    UnsupportedLanguage {
        /// The offending language tag.
        language: String,
    },

    /// A content hash string was not 64 lowercase hex characters.
    #[error("invalid content hash `{value}`")]
    InvalidContentHash {
        /// The offending hash string.
        value: String,
    },
}
