//! Wire models for batch delivery and release invocations.

use serde::{Deserialize, Serialize};

use crate::core::{
    AdmissionController, GateError, QueueMessage, ReleaseController, SemaphoreStore,
    WorkflowLauncher,
};
use crate::util::serde::MessageId;

/// A batch of deliveries, as handed to a queue-triggered handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueBatch {
    /// Messages in delivery order.
    #[serde(rename = "Records")]
    pub records: Vec<QueueMessage>,
}

/// One message to be redelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    /// Delivery identifier of the failed message.
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: MessageId,
}

/// Partial batch failure response. Messages not listed count as consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Messages the queue must redeliver.
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

/// Handle a JSON batch event and return the JSON partial failure response.
///
/// Errors abort the whole batch; the queue then redelivers every message in it.
pub async fn handle_batch_event<S, L>(
    controller: &AdmissionController<S, L>,
    event: &str,
) -> Result<String, GateError>
where
    S: SemaphoreStore,
    L: WorkflowLauncher,
{
    let batch: QueueBatch = serde_json::from_str(event).map_err(|e| GateError::Parse {
        message_id: MessageId::new("batch"),
        reason: e.to_string(),
    })?;
    let outcome = controller.handle_batch(&batch.records).await?;
    serde_json::to_string(&outcome.response()).map_err(|e| GateError::Queue(e.to_string()))
}

/// Handle a JSON release event; returns the new running count.
pub async fn handle_release_event<S: SemaphoreStore>(
    controller: &ReleaseController<S>,
    event: &str,
) -> Result<i64, GateError> {
    controller.handle_json(event).await
}
