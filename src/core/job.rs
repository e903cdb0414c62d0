//! Job specifications, queue messages, and release events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::GateError;
use crate::util::serde::{ExecutionName, JobId, MessageId, ResourceTypeKey};

/// Message payload describing one job.
///
/// `configuration` and any unrecognized top-level fields are carried through
/// untouched so the workflow engine receives the input exactly as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobSpec {
    /// Unique job identifier.
    pub job_id: JobId,
    /// Semaphore this job contends for.
    pub resource_type_key: ResourceTypeKey,
    /// Opaque resource configuration for the engine. Required; may be `null`.
    pub configuration: Value,
    /// Unrecognized fields, preserved for pass-through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobSpec {
    /// Build a job with an empty extra-field map.
    pub fn new(
        job_id: impl Into<JobId>,
        resource_type_key: impl Into<ResourceTypeKey>,
        configuration: Value,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            resource_type_key: resource_type_key.into(),
            configuration,
            extra: Map::new(),
        }
    }

    /// Serialize back to the JSON document handed to the engine.
    pub fn to_input(&self) -> String {
        // A Value/Map/String-only struct cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// One delivery from the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Delivery identifier used for partial batch failure reporting.
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
    /// Raw JSON job specification.
    pub body: String,
    /// FIFO group, conventionally the resource type key.
    #[serde(rename = "messageGroupId", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl QueueMessage {
    /// Create a message without a delivery group.
    pub fn new(message_id: impl Into<MessageId>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            group_id: None,
        }
    }

    /// Parse the body as a job specification.
    pub fn parse_job(&self) -> Result<JobSpec, GateError> {
        serde_json::from_str(&self.body).map_err(|e| GateError::Parse {
            message_id: self.message_id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Terminal state reported by the engine. Both variants release the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    /// Execution finished successfully.
    Succeeded,
    /// Execution failed, timed out, or was aborted.
    Failed,
}

/// Event delivered once per execution that reached a terminal state.
///
/// A serialized [`JobSpec`] is itself a valid release event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseEvent {
    /// Resource type whose slot is freed.
    pub resource_type_key: ResourceTypeKey,
    /// Job that held the slot, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Execution that held the slot, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_name: Option<ExecutionName>,
    /// Terminal state, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionOutcome>,
}

impl ReleaseEvent {
    /// Release event for a bare resource type.
    pub fn for_key(key: impl Into<ResourceTypeKey>) -> Self {
        Self {
            resource_type_key: key.into(),
            job_id: None,
            execution_name: None,
            status: None,
        }
    }

    /// Release event for a finished execution of `job`.
    pub fn finished(job: &JobSpec, execution: ExecutionName, status: ExecutionOutcome) -> Self {
        Self {
            resource_type_key: job.resource_type_key.clone(),
            job_id: Some(job.job_id.clone()),
            execution_name: Some(execution),
            status: Some(status),
        }
    }
}
