//! Delivery of execution completion events to the release controller.
//!
//! A failed release fails only that invocation; the event is retried here with
//! linear backoff, standing in for the orchestrator's own retry policy.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::{ReleaseController, ReleaseEvent, SemaphoreStore};

/// Bounded retry for release invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per event, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly per attempt.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Totals accumulated by [`run_release_loop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseStats {
    /// Events whose slot was released.
    pub released: usize,
    /// Release attempts that failed and were retried.
    pub retries: usize,
    /// Events given up on; each one is a leaked slot.
    pub exhausted: usize,
}

/// Deliver one event with retries. Returns `true` once released.
pub async fn deliver_release<S: SemaphoreStore>(
    controller: &ReleaseController<S>,
    event: &ReleaseEvent,
    policy: RetryPolicy,
    stats: &mut ReleaseStats,
) -> bool {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match controller.handle(event).await {
            Ok(_) => {
                stats.released += 1;
                return true;
            }
            Err(e) if attempt < attempts => {
                stats.retries += 1;
                tracing::warn!("release attempt {}/{} failed: {}", attempt, attempts, e);
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            Err(e) => {
                tracing::error!(
                    "giving up on release for {} after {} attempts: {}",
                    event.resource_type_key,
                    attempts,
                    e
                );
            }
        }
    }
    stats.exhausted += 1;
    false
}

/// Drain completion events until every sender is dropped.
pub async fn run_release_loop<S: SemaphoreStore>(
    events: mpsc::UnboundedReceiver<ReleaseEvent>,
    controller: Arc<ReleaseController<S>>,
    policy: RetryPolicy,
) -> ReleaseStats {
    run_release_loop_with(events, controller, policy, |_, _| {}).await
}

/// Like [`run_release_loop`], calling `on_settled(event, released)` once each
/// event is released or given up on.
pub async fn run_release_loop_with<S, F>(
    mut events: mpsc::UnboundedReceiver<ReleaseEvent>,
    controller: Arc<ReleaseController<S>>,
    policy: RetryPolicy,
    mut on_settled: F,
) -> ReleaseStats
where
    S: SemaphoreStore,
    F: FnMut(&ReleaseEvent, bool) + Send,
{
    let mut stats = ReleaseStats::default();
    while let Some(event) = events.recv().await {
        let released = deliver_release(&controller, &event, policy, &mut stats).await;
        on_settled(&event, released);
    }
    tracing::info!(
        "release loop finished: {} released, {} exhausted",
        stats.released,
        stats.exhausted
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GateError, SemaphoreRecord};
    use crate::infra::store::InMemorySemaphoreStore;
    use crate::util::serde::ResourceTypeKey;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` releases, then delegates.
    struct FlakyRelease {
        inner: InMemorySemaphoreStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl SemaphoreStore for FlakyRelease {
        async fn try_acquire(&self, key: &ResourceTypeKey) -> Result<i64, GateError> {
            self.inner.try_acquire(key).await
        }
        async fn release(&self, key: &ResourceTypeKey) -> Result<i64, GateError> {
            if self
                .failures
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(GateError::StoreUnavailable("throttled".into()));
            }
            self.inner.release(key).await
        }
        async fn set_limit(
            &self,
            key: &ResourceTypeKey,
            limit: u32,
            reset_running: bool,
        ) -> Result<SemaphoreRecord, GateError> {
            self.inner.set_limit(key, limit, reset_running).await
        }
        async fn record(&self, key: &ResourceTypeKey) -> Result<Option<SemaphoreRecord>, GateError> {
            self.inner.record(key).await
        }
        async fn snapshot(&self) -> Result<Vec<SemaphoreRecord>, GateError> {
            self.inner.snapshot().await
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_release_retried_until_success() {
        let key = ResourceTypeKey::new("cpu");
        let inner = InMemorySemaphoreStore::with_limits([("cpu", 1)]);
        inner.try_acquire(&key).await.unwrap();
        let store = Arc::new(FlakyRelease {
            inner,
            failures: AtomicU32::new(2),
        });
        let controller = Arc::new(ReleaseController::new(Arc::clone(&store)));

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ReleaseEvent::for_key("cpu")).unwrap();
        drop(tx);

        let stats = run_release_loop(rx, controller, policy(3)).await;
        assert_eq!(stats.released, 1);
        assert_eq!(stats.retries, 2);
        assert_eq!(store.record(&key).await.unwrap().unwrap().running_count, 0);
    }

    #[tokio::test]
    async fn test_exhausted_release_is_counted() {
        let store = FlakyRelease {
            inner: InMemorySemaphoreStore::with_limits([("cpu", 1)]),
            failures: AtomicU32::new(10),
        };
        let controller = ReleaseController::new(store);
        let mut stats = ReleaseStats::default();
        let released =
            deliver_release(&controller, &ReleaseEvent::for_key("cpu"), policy(2), &mut stats).await;
        assert!(!released);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.retries, 1);
    }

    #[tokio::test]
    async fn test_every_event_is_reported_settled() {
        let store = FlakyRelease {
            inner: InMemorySemaphoreStore::with_limits([("cpu", 2)]),
            failures: AtomicU32::new(2),
        };
        let controller = Arc::new(ReleaseController::new(store));
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ReleaseEvent::for_key("cpu")).unwrap();
        tx.send(ReleaseEvent::for_key("cpu")).unwrap();
        drop(tx);

        let mut settled = Vec::new();
        let stats = run_release_loop_with(rx, controller, policy(2), |event, released| {
            settled.push((event.resource_type_key.to_string(), released));
        })
        .await;
        assert_eq!(stats.exhausted, 1);
        assert_eq!(
            settled,
            vec![("cpu".to_owned(), false), ("cpu".to_owned(), true)]
        );
    }
}
