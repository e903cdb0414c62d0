//! In-memory FIFO job queue with message groups and redelivery.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AckSummary, JobQueue};
use crate::core::{GateError, QueueMessage};
use crate::runtime::api::BatchResponse;
use crate::util::serde::MessageId;

/// A queued message with its delivery bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Entry {
    pub(crate) message: QueueMessage,
    /// Global send order; FIFO is preserved across redelivery by reinserting on it.
    pub(crate) seq: u64,
    pub(crate) receive_count: u32,
}

/// Delivery state shared by the queue backends.
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    pub(crate) max_depth: usize,
    pub(crate) max_receive_count: Option<u32>,
    pub(crate) next_seq: u64,
    pub(crate) visible: VecDeque<Entry>,
    pub(crate) in_flight: HashMap<MessageId, Entry>,
    pub(crate) dead_letters: Vec<QueueMessage>,
}

impl QueueState {
    pub(crate) fn new(max_depth: usize, max_receive_count: Option<u32>) -> Self {
        Self {
            max_depth,
            max_receive_count,
            ..Self::default()
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.visible.len() + self.in_flight.len()
    }

    pub(crate) fn send(&mut self, body: String, group_id: Option<String>) -> Result<QueueMessage, GateError> {
        if self.len() >= self.max_depth {
            return Err(GateError::Queue("max queue depth reached".into()));
        }
        let message = QueueMessage {
            message_id: MessageId::new(Uuid::new_v4().to_string()),
            body,
            group_id,
        };
        self.visible.push_back(Entry {
            message: message.clone(),
            seq: self.next_seq,
            receive_count: 0,
        });
        self.next_seq += 1;
        Ok(message)
    }

    pub(crate) fn receive(&mut self, max: usize) -> Vec<QueueMessage> {
        let locked: HashSet<String> = self
            .in_flight
            .values()
            .filter_map(|e| e.message.group_id.clone())
            .collect();

        let mut batch = Vec::new();
        let mut kept = VecDeque::with_capacity(self.visible.len());
        while let Some(mut entry) = self.visible.pop_front() {
            let blocked = entry
                .message
                .group_id
                .as_ref()
                .is_some_and(|g| locked.contains(g));
            if batch.len() >= max || blocked {
                kept.push_back(entry);
                continue;
            }
            entry.receive_count += 1;
            batch.push(entry.message.clone());
            self.in_flight.insert(entry.message.message_id.clone(), entry);
        }
        self.visible = kept;
        batch
    }

    fn requeue(&mut self, entry: Entry, summary: &mut AckSummary) {
        if self
            .max_receive_count
            .is_some_and(|max| entry.receive_count >= max)
        {
            tracing::warn!(
                "message {} dead-lettered after {} receives",
                entry.message.message_id,
                entry.receive_count
            );
            self.dead_letters.push(entry.message);
            summary.dead_lettered += 1;
            return;
        }
        let pos = self.visible.partition_point(|e| e.seq < entry.seq);
        self.visible.insert(pos, entry);
        summary.requeued += 1;
    }

    pub(crate) fn acknowledge(&mut self, batch: &[QueueMessage], response: &BatchResponse) -> AckSummary {
        let failed: HashSet<&MessageId> = response
            .batch_item_failures
            .iter()
            .map(|f| &f.item_identifier)
            .collect();
        let mut summary = AckSummary::default();
        for message in batch {
            let Some(entry) = self.in_flight.remove(&message.message_id) else {
                continue;
            };
            if failed.contains(&message.message_id) {
                self.requeue(entry, &mut summary);
            } else {
                summary.deleted += 1;
            }
        }
        summary
    }

    pub(crate) fn abandon(&mut self, batch: &[QueueMessage]) -> AckSummary {
        let mut summary = AckSummary::default();
        for message in batch {
            if let Some(entry) = self.in_flight.remove(&message.message_id) {
                self.requeue(entry, &mut summary);
            }
        }
        summary
    }
}

/// Process-local queue, FIFO within each message group.
///
/// A group with any message in flight is not delivered again until that batch is
/// settled, mirroring FIFO queues that deliver a group to one consumer at a time.
pub struct InMemoryJobQueue {
    state: QueueState,
}

impl InMemoryJobQueue {
    /// Create a queue bounded to `max_depth` undeleted messages.
    pub fn new(max_depth: usize) -> Self {
        Self {
            state: QueueState::new(max_depth, None),
        }
    }

    /// Move messages to the dead-letter list once they have been received `max` times
    /// without being consumed.
    #[must_use]
    pub fn with_max_receive_count(mut self, max: u32) -> Self {
        self.state.max_receive_count = Some(max);
        self
    }

    /// Messages given up on after too many receives.
    pub fn dead_letters(&self) -> &[QueueMessage] {
        &self.state.dead_letters
    }

    /// Messages currently delivered but not settled.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.len()
    }
}

impl JobQueue for InMemoryJobQueue {
    fn send(&mut self, body: String, group_id: Option<String>) -> Result<QueueMessage, GateError> {
        self.state.send(body, group_id)
    }

    fn receive(&mut self, max: usize) -> Result<Vec<QueueMessage>, GateError> {
        Ok(self.state.receive(max))
    }

    fn acknowledge(
        &mut self,
        batch: &[QueueMessage],
        response: &BatchResponse,
    ) -> Result<AckSummary, GateError> {
        Ok(self.state.acknowledge(batch, response))
    }

    fn abandon(&mut self, batch: &[QueueMessage]) -> Result<AckSummary, GateError> {
        Ok(self.state.abandon(batch))
    }

    fn len(&self) -> usize {
        self.state.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::api::BatchItemFailure;

    fn fail(ids: &[&QueueMessage]) -> BatchResponse {
        BatchResponse {
            batch_item_failures: ids
                .iter()
                .map(|m| BatchItemFailure {
                    item_identifier: m.message_id.clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_fifo_and_partial_failure_redelivery() {
        let mut q = InMemoryJobQueue::new(10);
        let sent: Vec<_> = (0..3)
            .map(|i| q.send(format!("body-{i}"), None).unwrap())
            .collect();

        let batch = q.receive(10).unwrap();
        assert_eq!(batch, sent);

        let summary = q.acknowledge(&batch, &fail(&[&sent[1]])).unwrap();
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.requeued, 1);

        let again = q.receive(10).unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].message_id, sent[1].message_id);
    }

    #[test]
    fn test_group_locked_while_in_flight() {
        let mut q = InMemoryJobQueue::new(10);
        q.send("a1".into(), Some("a".into())).unwrap();
        q.send("b1".into(), Some("b".into())).unwrap();

        let first = q.receive(1).unwrap();
        assert_eq!(first[0].body, "a1");
        q.send("a2".into(), Some("a".into())).unwrap();

        let second = q.receive(10).unwrap();
        let bodies: Vec<_> = second.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["b1"]);

        q.acknowledge(&first, &BatchResponse::default()).unwrap();
        let third = q.receive(10).unwrap();
        assert_eq!(third[0].body, "a2");
    }

    #[test]
    fn test_abandon_requeues_in_order() {
        let mut q = InMemoryJobQueue::new(10);
        for i in 0..4 {
            q.send(format!("m{i}"), Some("g".into())).unwrap();
        }
        let batch = q.receive(2).unwrap();
        let summary = q.abandon(&batch).unwrap();
        assert_eq!(summary.requeued, 2);
        let bodies: Vec<_> = q.receive(10).unwrap().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["m0", "m1", "m2", "m3"]);
    }

    #[test]
    fn test_dead_letter_after_max_receives() {
        let mut q = InMemoryJobQueue::new(10).with_max_receive_count(2);
        q.send("poison".into(), None).unwrap();
        let first = q.receive(1).unwrap();
        q.abandon(&first).unwrap();
        let second = q.receive(1).unwrap();
        let summary = q.abandon(&second).unwrap();
        assert_eq!(summary.dead_lettered, 1);
        assert!(q.is_empty());
        assert_eq!(q.dead_letters().len(), 1);
    }

    #[test]
    fn test_queue_full() {
        let mut q = InMemoryJobQueue::new(1);
        q.send("one".into(), None).unwrap();
        assert!(matches!(q.send("two".into(), None), Err(GateError::Queue(_))));
    }
}
