//! Lifecycle state machine for registered tools.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tool_primitives::ToolId;
use tracing::debug;

/// States a registered tool can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// Published and executable.
    Active,
    /// Withdrawn by its owner; kept for reference.
    Inactive,
    /// Superseded; kept for existing callers but no longer recommended.
    Deprecated,
}

impl ToolStatus {
    /// Returns `true` when the tool may be executed.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Deprecated => "deprecated",
        }
    }

    /// Applies `event`, returning the resulting status.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when `event` is not allowed from `self`.
    pub fn apply(self, tool_id: ToolId, event: StatusEvent) -> Result<Self, TransitionError> {
        let next = match (self, event) {
            (_, StatusEvent::Deactivate) => Self::Inactive,
            (Self::Active, StatusEvent::Deprecate) => Self::Deprecated,
            (from, event) => {
                return Err(TransitionError {
                    tool_id,
                    from,
                    event,
                });
            }
        };
        if next != self {
            debug!(%tool_id, from = ?self, to = ?next, ?event, "tool status transition");
        }
        Ok(next)
    }
}

impl Display for ToolStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that move a tool between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    /// Withdraw the tool without deleting it.
    Deactivate,
    /// Mark the tool as superseded.
    Deprecate,
}

/// Transition was not permitted from the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition from {from} via {event:?} for tool {tool_id}")]
pub struct TransitionError {
    /// Tool whose transition failed.
    pub tool_id: ToolId,
    /// Status prior to the attempted transition.
    pub from: ToolStatus,
    /// Event that triggered the failure.
    pub event: StatusEvent,
}
