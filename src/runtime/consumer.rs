//! Queue consumer loop.
//!
//! Each consumer pulls one batch at a time, hands it to the admission controller,
//! and settles it with the queue: a handled batch is acknowledged with its partial
//! failure response, an aborted batch is abandoned so every message comes back.
//! Any number of consumers may share a queue and a store; they coordinate only
//! through the store's conditional acquire.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::core::{AdmissionController, BatchOutcome, GateError, SemaphoreStore, WorkflowLauncher};
use crate::infra::queue::{AckSummary, JobQueue};

/// What one poll did.
#[derive(Debug)]
pub enum PollResult {
    /// Nothing was visible.
    Idle,
    /// The batch was handled and acknowledged.
    Settled {
        /// Per-message results.
        outcome: BatchOutcome,
        /// How the queue settled the batch.
        ack: AckSummary,
    },
    /// Handling aborted; the whole batch was returned for redelivery.
    Aborted {
        /// Error that aborted the batch.
        error: GateError,
        /// How the queue settled the batch.
        ack: AckSummary,
    },
}

/// Totals accumulated by [`BatchConsumer::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Batches received.
    pub batches: usize,
    /// Jobs admitted.
    pub admitted: usize,
    /// Messages rejected by quota.
    pub rejected: usize,
    /// Batches aborted by an error.
    pub aborted: usize,
}

/// Pulls batches from a shared queue into an admission controller.
pub struct BatchConsumer<Q, S, L> {
    name: String,
    queue: Arc<Mutex<Q>>,
    controller: Arc<AdmissionController<S, L>>,
    batch_size: usize,
    idle_backoff: Duration,
}

impl<Q, S, L> BatchConsumer<Q, S, L>
where
    Q: JobQueue + Send,
    S: SemaphoreStore,
    L: WorkflowLauncher,
{
    /// Create a consumer named `name` receiving up to `batch_size` messages per poll.
    pub fn new(
        name: impl Into<String>,
        queue: Arc<Mutex<Q>>,
        controller: Arc<AdmissionController<S, L>>,
        batch_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            controller,
            batch_size: batch_size.max(1),
            idle_backoff: Duration::from_millis(50),
        }
    }

    /// Delay between polls when the queue is empty or failing.
    #[must_use]
    pub const fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    /// Receive, handle, and settle one batch. Only queue failures are returned as
    /// errors; admission failures are reported as [`PollResult::Aborted`].
    pub async fn poll_once(&self) -> Result<PollResult, GateError> {
        let batch = self.queue.lock().receive(self.batch_size)?;
        if batch.is_empty() {
            return Ok(PollResult::Idle);
        }
        tracing::debug!("consumer {} received {} messages", self.name, batch.len());

        match self.controller.handle_batch(&batch).await {
            Ok(outcome) => {
                let ack = self.queue.lock().acknowledge(&batch, &outcome.response())?;
                Ok(PollResult::Settled { outcome, ack })
            }
            Err(error) => {
                tracing::warn!(
                    "consumer {} returning batch of {} for redelivery: {}",
                    self.name,
                    batch.len(),
                    error
                );
                let ack = self.queue.lock().abandon(&batch)?;
                Ok(PollResult::Aborted { error, ack })
            }
        }
    }

    /// Poll until `shutdown` becomes `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ConsumerStats {
        let mut stats = ConsumerStats::default();
        tracing::info!("consumer {} started", self.name);
        while !*shutdown.borrow() {
            let idle = match self.poll_once().await {
                Ok(PollResult::Idle) => true,
                Ok(PollResult::Settled { outcome, .. }) => {
                    stats.batches += 1;
                    stats.admitted += outcome.admitted.len();
                    stats.rejected += outcome.rejected.len();
                    // Everything rejected: back off instead of spinning on a full quota.
                    outcome.admitted.is_empty() && outcome.deduplicated.is_empty()
                }
                Ok(PollResult::Aborted { .. }) => {
                    stats.batches += 1;
                    stats.aborted += 1;
                    true
                }
                Err(e) => {
                    tracing::error!("consumer {} queue failure: {}", self.name, e);
                    true
                }
            };
            if idle {
                tokio::select! {
                    () = tokio::time::sleep(self.idle_backoff) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        tracing::info!(
            "consumer {} stopped after {} batches ({} admitted, {} rejected, {} aborted)",
            self.name,
            stats.batches,
            stats.admitted,
            stats.rejected,
            stats.aborted
        );
        stats
    }
}
