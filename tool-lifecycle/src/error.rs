use thiserror::Error;
use tool_cache::StorageError;
use tool_primitives::{AgentId, ContentHash, ToolId};
use tool_validation::ValidationError;

use crate::execution::ExecutionError;
use crate::gateway::GatewayError;
use crate::index::IndexError;
use crate::lifecycle::{ToolStatus, TransitionError};

/// Result alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Failures of the registration sagas and record bookkeeping.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Required definition fields were missing.
    #[error("invalid tool definition: {}", .errors.join("; "))]
    InvalidDefinition {
        /// One message per missing field.
        errors: Vec<String>,
    },
    /// No record exists for the tool.
    #[error("tool {tool_id} not found")]
    ToolNotFound {
        /// Requested identifier.
        tool_id: ToolId,
    },
    /// The caller does not own the tool.
    #[error("agent {agent_id} does not own tool {tool_id} (owner {owner})")]
    NotOwner {
        /// Target tool.
        tool_id: ToolId,
        /// Calling agent.
        agent_id: AgentId,
        /// Owning agent.
        owner: AgentId,
    },
    /// The gateway refused to publish a new tool.
    #[error("failed to publish tool {tool_id}")]
    Publish {
        /// Tool whose record was rolled back.
        tool_id: ToolId,
        /// Gateway failure.
        #[source]
        source: GatewayError,
    },
    /// The record references an artifact that is no longer cached.
    #[error("artifact {content_hash} for tool {tool_id} is missing")]
    ArtifactMissing {
        /// Tool referencing the artifact.
        tool_id: ToolId,
        /// Missing artifact.
        content_hash: ContentHash,
    },
    /// The tool cannot be executed in its current status.
    #[error("tool {tool_id} is {status}")]
    ToolInactive {
        /// Target tool.
        tool_id: ToolId,
        /// Current status.
        status: ToolStatus,
    },
    /// No execution backend is configured.
    #[error("no execution backend configured")]
    ExecutionUnavailable,
    /// Status transition not permitted.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    /// Tool index failure.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Every failure a lifecycle operation can report.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The submission was not admitted.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A registration check or record operation failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// Artifact storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The execution backend failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl LifecycleError {
    /// Returns `true` when the target tool does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Registration(
                RegistrationError::ToolNotFound { .. }
                    | RegistrationError::Index(IndexError::NotFound { .. })
            )
        )
    }

    /// Returns `true` when the caller failed an ownership check.
    #[must_use]
    pub fn is_not_owner(&self) -> bool {
        matches!(self, Self::Registration(RegistrationError::NotOwner { .. }))
    }
}

impl From<IndexError> for LifecycleError {
    fn from(value: IndexError) -> Self {
        Self::Registration(value.into())
    }
}

impl From<TransitionError> for LifecycleError {
    fn from(value: TransitionError) -> Self {
        Self::Registration(value.into())
    }
}
