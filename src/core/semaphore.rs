//! Keyed-counter semaphore abstraction.
//!
//! A [`SemaphoreStore`] keeps one [`SemaphoreRecord`] per resource type and exposes
//! exactly two mutations on the hot path: a store-side conditional increment and an
//! unconditional decrement. Implementations must evaluate the `running < limit`
//! condition inside the store, never as a client-side read followed by a write.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::GateError;
use crate::util::serde::ResourceTypeKey;

/// Persisted counter for one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SemaphoreRecord {
    /// Partition key.
    pub resource_type_key: ResourceTypeKey,
    /// Admitted-but-not-released jobs. Signed: release has no floor, so a negative
    /// value is evidence of a double release.
    pub running_count: i64,
    /// Maximum concurrently admitted jobs; owned by the quota seeder.
    pub limit: u32,
}

impl SemaphoreRecord {
    /// Fresh record with no running jobs.
    pub fn new(key: impl Into<ResourceTypeKey>, limit: u32) -> Self {
        Self {
            resource_type_key: key.into(),
            running_count: 0,
            limit,
        }
    }

    /// The acquire condition, as evaluated by the store.
    pub fn has_capacity(&self) -> bool {
        self.running_count < i64::from(self.limit)
    }

    /// Slots still free; zero when at or over the limit.
    pub fn available(&self) -> u32 {
        let free = i64::from(self.limit) - self.running_count;
        u32::try_from(free.max(0)).unwrap_or(u32::MAX)
    }
}

/// Consistent key-value store used as a distributed counting semaphore.
#[async_trait]
pub trait SemaphoreStore: Send + Sync {
    /// Increment `running_count` only if `running_count < limit` holds at evaluation
    /// time. Returns the new count, or [`GateError::QuotaExceeded`] leaving the record
    /// unchanged. A key with no record behaves as `limit = 0`.
    async fn try_acquire(&self, key: &ResourceTypeKey) -> Result<i64, GateError>;

    /// Decrement `running_count` unconditionally and return the new count.
    async fn release(&self, key: &ResourceTypeKey) -> Result<i64, GateError>;

    /// Create or update the record's limit. With `reset_running`, `running_count`
    /// is set back to zero. Only the quota seeder calls this.
    async fn set_limit(
        &self,
        key: &ResourceTypeKey,
        limit: u32,
        reset_running: bool,
    ) -> Result<SemaphoreRecord, GateError>;

    /// Read a single record. Inspection only; never used to decide admission.
    async fn record(&self, key: &ResourceTypeKey) -> Result<Option<SemaphoreRecord>, GateError>;

    /// Read every record, ordered by key.
    async fn snapshot(&self) -> Result<Vec<SemaphoreRecord>, GateError>;

    /// Tear down the client. Subsequent calls fail with `StoreUnavailable`.
    async fn shutdown(&self) -> Result<(), GateError> {
        Ok(())
    }
}

#[async_trait]
impl<T: SemaphoreStore + ?Sized> SemaphoreStore for Arc<T> {
    async fn try_acquire(&self, key: &ResourceTypeKey) -> Result<i64, GateError> {
        (**self).try_acquire(key).await
    }

    async fn release(&self, key: &ResourceTypeKey) -> Result<i64, GateError> {
        (**self).release(key).await
    }

    async fn set_limit(
        &self,
        key: &ResourceTypeKey,
        limit: u32,
        reset_running: bool,
    ) -> Result<SemaphoreRecord, GateError> {
        (**self).set_limit(key, limit, reset_running).await
    }

    async fn record(&self, key: &ResourceTypeKey) -> Result<Option<SemaphoreRecord>, GateError> {
        (**self).record(key).await
    }

    async fn snapshot(&self) -> Result<Vec<SemaphoreRecord>, GateError> {
        (**self).snapshot().await
    }

    async fn shutdown(&self) -> Result<(), GateError> {
        (**self).shutdown().await
    }
}

/// Store decorator applying a request timeout to acquire and release.
///
/// An elapsed timeout is reported as [`GateError::StoreUnavailable`]. The inner
/// operation is still atomic at the store, so a timed-out acquire may or may not
/// have taken effect; callers treat it like any other infrastructure failure.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStore<S> {
    /// Wrap `inner` with a per-call timeout.
    pub const fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Access the wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, GateError>
    where
        T: Send,
        F: std::future::Future<Output = Result<T, GateError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("store {} timed out after {:?}", op, self.timeout);
                Err(GateError::StoreUnavailable(format!(
                    "{op} timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl<S: SemaphoreStore> SemaphoreStore for TimeoutStore<S> {
    async fn try_acquire(&self, key: &ResourceTypeKey) -> Result<i64, GateError> {
        self.bounded("acquire", self.inner.try_acquire(key)).await
    }

    async fn release(&self, key: &ResourceTypeKey) -> Result<i64, GateError> {
        self.bounded("release", self.inner.release(key)).await
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

    async fn shutdown(&self) -> Result<(), GateError> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_capacity() {
        let mut rec = SemaphoreRecord::new("cpu", 2);
        assert!(rec.has_capacity());
        assert_eq!(rec.available(), 2);
        rec.running_count = 2;
        assert!(!rec.has_capacity());
        assert_eq!(rec.available(), 0);
        rec.running_count = 5;
        assert_eq!(rec.available(), 0);
    }

    #[test]
    fn test_zero_limit_never_has_capacity() {
        let rec = SemaphoreRecord::new("cpu", 0);
        assert!(!rec.has_capacity());
    }

    struct StalledStore;

    #[async_trait]
    impl SemaphoreStore for StalledStore {
        async fn try_acquire(&self, _key: &ResourceTypeKey) -> Result<i64, GateError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        }
        async fn release(&self, _key: &ResourceTypeKey) -> Result<i64, GateError> {
            Ok(0)
        }
        async fn set_limit(
            &self,
            key: &ResourceTypeKey,
            limit: u32,
            _reset_running: bool,
        ) -> Result<SemaphoreRecord, GateError> {
            Ok(SemaphoreRecord::new(key.clone(), limit))
        }
        async fn record(&self, _key: &ResourceTypeKey) -> Result<Option<SemaphoreRecord>, GateError> {
            Ok(None)
        }
        async fn snapshot(&self) -> Result<Vec<SemaphoreRecord>, GateError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_store_unavailable() {
        let store = TimeoutStore::new(StalledStore, Duration::from_millis(20));
        let err = store.try_acquire(&ResourceTypeKey::new("cpu")).await.unwrap_err();
        assert!(matches!(err, GateError::StoreUnavailable(_)));
        assert_eq!(store.release(&ResourceTypeKey::new("cpu")).await.unwrap(), 0);
    }
}
