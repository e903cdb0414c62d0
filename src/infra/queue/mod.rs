//! Job queue backends.
//!
//! The queue delivers batches at least once. After a batch is handled, the consumer
//! either acknowledges it with a partial failure response (every message not listed
//! is consumed) or abandons it, in which case every message is redelivered.

pub mod memory;
pub mod yaque;

pub use memory::InMemoryJobQueue;
pub use yaque::YaqueJobQueue;

use crate::core::{GateError, QueueMessage};
use crate::runtime::api::BatchResponse;

/// Counts from settling one delivered batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckSummary {
    /// Messages removed from the queue.
    pub deleted: usize,
    /// Messages made visible again for redelivery.
    pub requeued: usize,
    /// Messages moved to the dead-letter list after too many receives.
    pub dead_lettered: usize,
}

/// Abstraction for queue backends feeding the admission controller.
pub trait JobQueue {
    /// Append a message to `group_id` (FIFO within a group). Returns its delivery id.
    fn send(&mut self, body: String, group_id: Option<String>) -> Result<QueueMessage, GateError>;
    /// Deliver up to `max` visible messages, skipping groups with messages in flight.
    fn receive(&mut self, max: usize) -> Result<Vec<QueueMessage>, GateError>;
    /// Settle a delivered batch: listed failures are redelivered, the rest deleted.
    fn acknowledge(
        &mut self,
        batch: &[QueueMessage],
        response: &BatchResponse,
    ) -> Result<AckSummary, GateError>;
    /// Return every message of a delivered batch for redelivery.
    fn abandon(&mut self, batch: &[QueueMessage]) -> Result<AckSummary, GateError>;
    /// Messages not yet deleted (visible plus in flight).
    fn len(&self) -> usize;
    /// Whether nothing remains to deliver or settle.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
