//! Tool records and the sagas that register, update and withdraw them.
//!
//! [`ToolLifecycleManager`] ties the validation service and artifact cache to
//! a [`ToolIndex`] and a [`ToolGateway`]. Both seams are traits so deployments
//! can plug in durable stores and remote registries; in-memory
//! implementations are provided for embedding and tests.

#![warn(missing_docs, clippy::pedantic)]

mod definition;
mod error;
mod execution;
mod gateway;
mod index;
mod lifecycle;
mod manager;
mod record;

pub use definition::{ParameterSchema, ReturnSchema, ToolDefinition, ToolSchema, ValidationRule};
pub use error::{LifecycleError, LifecycleResult, RegistrationError};
pub use execution::{
    ExecutionBackend, ExecutionError, ExecutionHandle, ExecutionMetrics, ExecutionReport,
    ExecutionRequest, ExecutionResult, ExecutionStatus, wait_for,
};
pub use gateway::{GatewayError, GatewayResult, MemoryGateway, PublishAck, ToolGateway};
pub use index::{IndexError, IndexResult, MemoryToolIndex, ToolFilter, ToolIndex};
pub use lifecycle::{StatusEvent, ToolStatus, TransitionError};
pub use manager::{DEFAULT_POLL_INTERVAL, Deregistration, RegisterOptions, ToolLifecycleManager};
pub use record::{ArtifactRef, ToolPublicMetadata, ToolRecord, ToolStatusReport};
