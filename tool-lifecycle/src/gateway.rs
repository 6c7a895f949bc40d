//! Remote tool gateway integration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tool_primitives::{AgentId, ToolId};

use crate::record::{ToolPublicMetadata, ToolRecord};

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced by gateway integration.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Gateway refused the request.
    #[error("gateway rejected tool {tool_id}: {reason}")]
    Rejected {
        /// Tool the request concerned.
        tool_id: ToolId,
        /// Reason given by the gateway.
        reason: String,
    },
    /// Gateway could not be reached or failed internally.
    #[error("gateway backend error: {reason}")]
    Backend {
        /// Human-readable context provided by the backend.
        reason: String,
    },
}

impl GatewayError {
    /// Convenience helper to construct backend errors.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Acknowledgement returned by a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishAck {
    /// Published tool.
    pub tool_id: ToolId,
    /// Invocation path exposed by the gateway.
    pub endpoint: String,
    /// Publication time.
    pub published_at: DateTime<Utc>,
}

/// Trait implemented by tool registry/gateway backends.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Makes a tool discoverable and invocable.
    async fn publish(&self, record: &ToolRecord) -> GatewayResult<PublishAck>;

    /// Withdraws a tool.
    async fn unpublish(&self, tool_id: ToolId, agent_id: AgentId) -> GatewayResult<()>;

    /// Refreshes the public metadata of an already published tool.
    async fn sync_metadata(
        &self,
        tool_id: ToolId,
        metadata: &ToolPublicMetadata,
    ) -> GatewayResult<()>;
}

/// In-process [`ToolGateway`] that can be switched offline.
#[derive(Debug)]
pub struct MemoryGateway {
    published: RwLock<HashMap<ToolId, ToolPublicMetadata>>,
    available: AtomicBool,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self {
            published: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryGateway {
    /// Creates an empty, reachable gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call succeed or fail with a backend error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Returns the published metadata for `tool_id`.
    pub async fn published(&self, tool_id: ToolId) -> Option<ToolPublicMetadata> {
        self.published.read().await.get(&tool_id).cloned()
    }

    /// Number of published tools.
    pub async fn len(&self) -> usize {
        self.published.read().await.len()
    }

    /// Returns `true` when nothing is published.
    pub async fn is_empty(&self) -> bool {
        self.published.read().await.is_empty()
    }

    fn ensure_available(&self) -> GatewayResult<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(GatewayError::backend("gateway unavailable"))
        }
    }
}

#[async_trait]
impl ToolGateway for MemoryGateway {
    async fn publish(&self, record: &ToolRecord) -> GatewayResult<PublishAck> {
        self.ensure_available()?;
        let metadata = record.public_metadata();
        self.published.write().await.insert(record.tool_id, metadata);
        Ok(PublishAck {
            tool_id: record.tool_id,
            endpoint: format!("/tools/{}/execute", record.tool_id),
            published_at: Utc::now(),
        })
    }

    async fn unpublish(&self, tool_id: ToolId, _agent_id: AgentId) -> GatewayResult<()> {
        self.ensure_available()?;
        self.published.write().await.remove(&tool_id);
        Ok(())
    }

    async fn sync_metadata(
        &self,
        tool_id: ToolId,
        metadata: &ToolPublicMetadata,
    ) -> GatewayResult<()> {
        self.ensure_available()?;
        let mut guard = self.published.write().await;
        let Some(entry) = guard.get_mut(&tool_id) else {
            return Err(GatewayError::Rejected {
                tool_id,
                reason: "tool is not published".into(),
            });
        };
        *entry = metadata.clone();
        Ok(())
    }
}
