//! Workflow launch abstraction and execution naming.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{GateError, JobSpec};
use crate::util::serde::{ExecutionName, JobId};

/// Identifier of a started execution, returned for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHandle {
    /// Engine-assigned execution identifier (e.g. an ARN).
    pub execution_id: String,
    /// Name the execution was started under.
    pub name: ExecutionName,
    /// Start timestamp in milliseconds since epoch.
    pub started_at_ms: u128,
}

/// Result of asking the engine to start an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new execution was started.
    Started(ExecutionHandle),
    /// An execution with this name already exists; nothing new was started.
    AlreadyStarted(ExecutionHandle),
}

impl LaunchOutcome {
    /// Handle of the execution, new or pre-existing.
    pub const fn handle(&self) -> &ExecutionHandle {
        match self {
            Self::Started(h) | Self::AlreadyStarted(h) => h,
        }
    }
}

/// Starts one execution of the downstream engine.
#[async_trait]
pub trait WorkflowLauncher: Send + Sync {
    /// Start an execution of `job` named `name`. The job is passed through as opaque
    /// input. Implementations dedupe on `name`.
    async fn start(&self, job: &JobSpec, name: &ExecutionName) -> Result<LaunchOutcome, GateError>;
}

#[async_trait]
impl<T: WorkflowLauncher + ?Sized> WorkflowLauncher for std::sync::Arc<T> {
    async fn start(&self, job: &JobSpec, name: &ExecutionName) -> Result<LaunchOutcome, GateError> {
        (**self).start(job, name).await
    }
}

/// How execution names are generated for admitted jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionNaming {
    /// Fresh random name per attempt; retried launches never collide and never dedupe.
    #[default]
    Random,
    /// Name derived from the job id; a redelivered job maps onto its earlier execution.
    Deterministic,
}

impl ExecutionNaming {
    /// Produce the execution name for `job_id` under this strategy.
    pub fn name_for(self, job_id: &JobId) -> ExecutionName {
        match self {
            Self::Random => ExecutionName::new(Uuid::new_v4().to_string()),
            Self::Deterministic => ExecutionName::new(
                Uuid::new_v5(&Uuid::NAMESPACE_OID, job_id.as_str().as_bytes()).to_string(),
            ),
        }
    }
}
