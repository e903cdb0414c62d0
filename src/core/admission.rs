//! Admission control over a batch of queue messages.
//!
//! Each message is handled on its own, in batch order:
//!
//! 1. parse the job (a malformed body aborts the batch),
//! 2. conditionally acquire a slot for its resource type,
//! 3. start the workflow execution.
//!
//! A quota rejection is a normal outcome: the message id is reported back so the
//! queue redelivers it later. Any other failure aborts the remainder of the batch,
//! after which the queue redelivers the whole batch. Slots acquired earlier in an
//! aborted batch are not rolled back.

use std::sync::Arc;

use crate::core::audit::{build_audit_event, record_to, AuditAction, AuditSink, SharedAuditSink};
use crate::core::{
    ExecutionHandle, ExecutionNaming, GateError, JobSpec, LaunchOutcome, QueueMessage,
    SemaphoreStore, WorkflowLauncher,
};
use crate::runtime::api::{BatchItemFailure, BatchResponse};
use crate::util::serde::{MessageId, ResourceTypeKey};

/// A job that was granted a slot and whose execution is running.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Delivery that carried the job.
    pub message_id: MessageId,
    /// The admitted job.
    pub job: JobSpec,
    /// Execution holding the slot.
    pub execution: ExecutionHandle,
    /// `running_count` right after the acquire.
    pub running_count: i64,
}

/// Result of handling one batch to completion.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Jobs admitted in this pass, in batch order.
    pub admitted: Vec<Admission>,
    /// Messages whose execution already existed; consumed without holding a new slot.
    pub deduplicated: Vec<MessageId>,
    /// Messages rejected by quota, in batch order.
    pub rejected: Vec<MessageId>,
}

impl BatchOutcome {
    /// Partial batch failure response: only quota rejections are listed.
    pub fn response(&self) -> BatchResponse {
        BatchResponse {
            batch_item_failures: self
                .rejected
                .iter()
                .map(|id| BatchItemFailure {
                    item_identifier: id.clone(),
                })
                .collect(),
        }
    }
}

enum Step {
    Admitted(Admission),
    Deduplicated,
    Rejected,
}

/// Gates queue messages into the workflow engine under per-type quotas.
pub struct AdmissionController<S, L> {
    store: S,
    launcher: L,
    naming: ExecutionNaming,
    audit: Option<SharedAuditSink>,
}

impl<S, L> AdmissionController<S, L>
where
    S: SemaphoreStore,
    L: WorkflowLauncher,
{
    /// Create a controller with random execution names.
    pub const fn new(store: S, launcher: L) -> Self {
        Self {
            store,
            launcher,
            naming: ExecutionNaming::Random,
            audit: None,
        }
    }

    /// Choose the execution naming strategy.
    #[must_use]
    pub const fn with_naming(mut self, naming: ExecutionNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Arc::new(parking_lot::Mutex::new(audit)));
        self
    }

    /// Share an existing audit sink.
    #[must_use]
    pub fn with_shared_audit(mut self, audit: SharedAuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The store this controller acquires from.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Handle a batch. Returns which messages were rejected by quota, or the first
    /// non-quota error, which aborts the rest of the batch.
    pub async fn handle_batch(&self, messages: &[QueueMessage]) -> Result<BatchOutcome, GateError> {
        let mut outcome = BatchOutcome::default();
        for (index, message) in messages.iter().enumerate() {
            let step = self.admit_one(message).await.inspect_err(|e| {
                tracing::warn!(
                    "batch aborted at message {} ({} of {}): {}",
                    message.message_id,
                    index + 1,
                    messages.len(),
                    e
                );
            })?;
            match step {
                Step::Admitted(admission) => outcome.admitted.push(admission),
                Step::Deduplicated => outcome.deduplicated.push(message.message_id.clone()),
                Step::Rejected => outcome.rejected.push(message.message_id.clone()),
            }
        }
        tracing::info!(
            "batch handled: {} admitted, {} deduplicated, {} rejected",
            outcome.admitted.len(),
            outcome.deduplicated.len(),
            outcome.rejected.len()
        );
        Ok(outcome)
    }

    async fn admit_one(&self, message: &QueueMessage) -> Result<Step, GateError> {
        let job = message.parse_job()?;
        let key = &job.resource_type_key;

        let running_count = match self.store.try_acquire(key).await {
            Ok(count) => count,
            Err(GateError::QuotaExceeded(_)) => {
                tracing::warn!("job {} rejected: quota exhausted for {}", job.job_id, key);
                record_to(
                    self.audit.as_ref(),
                    build_audit_event(Some(&job.job_id), key, AuditAction::Rejected, None, None),
                );
                return Ok(Step::Rejected);
            }
            Err(e) => return Err(e),
        };

        let name = self.naming.name_for(&job.job_id);
        match self.launcher.start(&job, &name).await {
            Ok(LaunchOutcome::Started(execution)) => {
                tracing::info!(
                    "job {} admitted on {} (running={}), execution {}",
                    job.job_id,
                    key,
                    running_count,
                    execution.execution_id
                );
                record_to(
                    self.audit.as_ref(),
                    build_audit_event(
                        Some(&job.job_id),
                        key,
                        AuditAction::Admitted,
                        Some(running_count),
                        Some(execution.execution_id.clone()),
                    ),
                );
                Ok(Step::Admitted(Admission {
                    message_id: message.message_id.clone(),
                    job,
                    execution,
                    running_count,
                }))
            }
            Ok(LaunchOutcome::AlreadyStarted(existing)) => {
                // The earlier delivery owns a slot already; give this one back.
                let count = self.give_back(&job, key, &existing.execution_id).await?;
                tracing::info!(
                    "job {} already running as {}, slot returned (running={})",
                    job.job_id,
                    existing.execution_id,
                    count
                );
                record_to(
                    self.audit.as_ref(),
                    build_audit_event(
                        Some(&job.job_id),
                        key,
                        AuditAction::Deduplicated,
                        Some(count),
                        Some(existing.execution_id),
                    ),
                );
                Ok(Step::Deduplicated)
            }
            Err(launch_err) => {
                let count = self
                    .give_back(&job, key, &launch_err.to_string())
                    .await?;
                record_to(
                    self.audit.as_ref(),
                    build_audit_event(
                        Some(&job.job_id),
                        key,
                        AuditAction::Compensated,
                        Some(count),
                        Some(launch_err.to_string()),
                    ),
                );
                Err(match launch_err {
                    e @ GateError::WorkflowStart { .. } => e,
                    other => GateError::WorkflowStart {
                        job_id: job.job_id.clone(),
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    /// Release a slot acquired for `job` that no execution will hold.
    async fn give_back(
        &self,
        job: &JobSpec,
        key: &ResourceTypeKey,
        context: &str,
    ) -> Result<i64, GateError> {
        self.store.release(key).await.map_err(|release_err| {
            tracing::error!(
                "slot leaked on {} for job {}: compensating release failed: {}",
                key,
                job.job_id,
                release_err
            );
            record_to(
                self.audit.as_ref(),
                build_audit_event(
                    Some(&job.job_id),
                    key,
                    AuditAction::ReleaseFailed,
                    None,
                    Some(release_err.to_string()),
                ),
            );
            GateError::WorkflowStart {
                job_id: job.job_id.clone(),
                reason: format!("{context}; compensating release failed, slot leaked: {release_err}"),
            }
        })
    }
}
