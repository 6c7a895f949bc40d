//! Admission of submitted tool source.
//!
//! [`ValidationService`] consults the artifact cache, falls back to the
//! analyzers, evaluates the result against a [`tool_policy::SecurityPolicy`]
//! and caches accepted submissions.

#![warn(missing_docs, clippy::pedantic)]

pub mod error;
pub mod report;
pub mod service;

pub use error::{ServiceResult, ValidationError};
pub use report::{CacheMode, ValidationReport, ValidationRequest, ValidationSummary};
pub use service::ValidationService;
