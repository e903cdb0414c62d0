//! Error types for admission and release operations.

use thiserror::Error;

use crate::util::serde::{JobId, MessageId, ResourceTypeKey};

/// Errors produced by the gate components.
#[derive(Debug, Error)]
pub enum GateError {
    /// Message body is not a valid job specification.
    #[error("malformed message {message_id}: {reason}")]
    Parse {
        /// Delivery identifier of the offending message.
        message_id: MessageId,
        /// Parser diagnostic.
        reason: String,
    },
    /// Conditional acquire failed: the resource type is at its limit.
    #[error("quota exceeded for resource type {0}")]
    QuotaExceeded(ResourceTypeKey),
    /// Store could not be reached, timed out, or was shut down.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// Release targeted a resource type with no seeded record.
    #[error("unknown resource type: {0}")]
    UnknownResourceType(ResourceTypeKey),
    /// Workflow engine refused or failed to start an execution after a slot was acquired.
    #[error("workflow start failed for job {job_id}: {reason}")]
    WorkflowStart {
        /// Job whose execution could not be started.
        job_id: JobId,
        /// Engine or compensation diagnostic.
        reason: String,
    },
    /// Release handler could not free the slot; the orchestrator should redeliver.
    #[error("release failed for resource type {key}: {reason}")]
    Release {
        /// Resource type whose slot was not released.
        key: ResourceTypeKey,
        /// Underlying failure.
        reason: String,
    },
    /// Queue backend failure (full, closed, or unreadable).
    #[error("queue error: {0}")]
    Queue(String),
    /// Configuration is missing or inconsistent.
    #[error("configuration invalid: {0}")]
    Config(String),
}

impl GateError {
    /// Whether this error is the expected business-level rejection.
    pub const fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
