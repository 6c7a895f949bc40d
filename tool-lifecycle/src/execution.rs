//! Execution backend seam.
//!
//! The runtime never runs tool code itself. It hands validated source to an
//! [`ExecutionBackend`] and polls for the result.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tool_cache::ExecutionMetadata;
use tool_primitives::{Language, ToolId};
use tracing::{debug, warn};
use uuid::Uuid;

/// Result alias for execution operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Errors surfaced by execution backends.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Backend does not know the execution.
    #[error("unknown execution {execution_id}")]
    UnknownExecution {
        /// Identifier returned by `submit`.
        execution_id: Uuid,
    },
    /// Backend failure.
    #[error("execution backend error: {reason}")]
    Backend {
        /// Human-readable context provided by the backend.
        reason: String,
    },
}

impl ExecutionError {
    /// Convenience helper to construct backend errors.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }
}

/// Code and limits handed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Tool being executed.
    pub tool_id: ToolId,
    /// Source language.
    pub language: Language,
    /// Validated source.
    pub code: String,
    /// Call arguments.
    pub parameters: Value,
    /// Wall-clock limit.
    pub timeout: Duration,
    /// Memory estimate in megabytes.
    pub memory_limit_mb: u64,
    /// Whether the tool declared network access.
    pub requires_network: bool,
    /// Whether the tool declared filesystem access.
    pub requires_filesystem: bool,
}

impl ExecutionRequest {
    /// Builds a request using the limits stored with the artifact.
    #[must_use]
    pub fn new(
        tool_id: ToolId,
        language: Language,
        code: impl Into<String>,
        parameters: Value,
        execution: &ExecutionMetadata,
    ) -> Self {
        Self {
            tool_id,
            language,
            code: code.into(),
            parameters,
            timeout: Duration::from_secs(execution.timeout_seconds),
            memory_limit_mb: execution.estimated_memory_mb,
            requires_network: execution.requires_network,
            requires_filesystem: execution.requires_filesystem,
        }
    }
}

/// Reference to a submitted execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionHandle {
    /// Backend-assigned identifier.
    pub execution_id: Uuid,
    /// Tool being executed.
    pub tool_id: ToolId,
}

/// Progress of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Still running.
    Running,
    /// Completed with output.
    Success,
    /// Completed with an error.
    Error,
    /// Exceeded its time limit.
    Timeout,
}

impl ExecutionStatus {
    /// Returns `true` once the execution will not change further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Resource usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Peak memory in megabytes, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_peak_mb: Option<f64>,
    /// CPU time in milliseconds, if measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_time_ms: Option<u64>,
}

/// Snapshot returned by [`ExecutionBackend::poll`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Execution the report describes.
    pub handle: ExecutionHandle,
    /// Current status.
    pub status: ExecutionStatus,
    /// Tool output, once successful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error message, once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Resource usage so far.
    #[serde(default)]
    pub metrics: ExecutionMetrics,
}

impl ExecutionReport {
    /// Report for an execution abandoned after `waited`.
    #[must_use]
    pub fn timed_out(handle: ExecutionHandle, waited: Duration) -> Self {
        Self {
            handle,
            status: ExecutionStatus::Timeout,
            output: None,
            error: Some(format!("no result after {} ms", waited.as_millis())),
            metrics: ExecutionMetrics {
                duration_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                ..ExecutionMetrics::default()
            },
        }
    }
}

/// Trait implemented by sandboxed execution services.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Starts an execution.
    async fn submit(&self, request: ExecutionRequest) -> ExecutionResult<ExecutionHandle>;

    /// Reports progress of an execution.
    async fn poll(&self, handle: &ExecutionHandle) -> ExecutionResult<ExecutionReport>;

    /// Stops an execution.
    async fn cancel(&self, handle: &ExecutionHandle) -> ExecutionResult<()>;
}

/// Polls `handle` every `interval` until it reaches a terminal status.
///
/// When `timeout` elapses first the execution is cancelled (best-effort) and
/// a [`ExecutionStatus::Timeout`] report is returned.
///
/// # Errors
///
/// Propagates [`ExecutionError`] from `poll`.
pub async fn wait_for(
    backend: &dyn ExecutionBackend,
    handle: &ExecutionHandle,
    timeout: Duration,
    interval: Duration,
) -> ExecutionResult<ExecutionReport> {
    let started = Instant::now();
    loop {
        let report = backend.poll(handle).await?;
        if report.status.is_terminal() {
            debug!(
                execution_id = %handle.execution_id,
                tool_id = %handle.tool_id,
                status = ?report.status,
                "execution finished"
            );
            return Ok(report);
        }
        let waited = started.elapsed();
        if waited >= timeout {
            if let Err(err) = backend.cancel(handle).await {
                warn!(
                    execution_id = %handle.execution_id,
                    error = %err,
                    "failed to cancel timed out execution"
                );
            }
            return Ok(ExecutionReport::timed_out(*handle, waited));
        }
        sleep(interval.min(timeout - waited)).await;
    }
}
