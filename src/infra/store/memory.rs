//! In-memory semaphore store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{GateError, SemaphoreRecord, SemaphoreStore};
use crate::util::serde::ResourceTypeKey;

/// Process-local store. The condition check and the increment happen under a
/// single lock acquisition, which gives per-key linearizability within one process.
pub struct InMemorySemaphoreStore {
    records: Mutex<HashMap<ResourceTypeKey, SemaphoreRecord>>,
    closed: AtomicBool,
}

impl InMemorySemaphoreStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a store pre-seeded with `(key, limit)` pairs and zero running counts.
    pub fn with_limits<I, K>(limits: I) -> Self
    where
        I: IntoIterator<Item = (K, u32)>,
        K: Into<ResourceTypeKey>,
    {
        let records = limits
            .into_iter()
            .map(|(key, limit)| {
                let key = key.into();
                (key.clone(), SemaphoreRecord::new(key, limit))
            })
            .collect();
        Self {
            records: Mutex::new(records),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), GateError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GateError::StoreUnavailable("store has been shut down".into()));
        }
        Ok(())
    }
}

impl Default for InMemorySemaphoreStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SemaphoreStore for InMemorySemaphoreStore {
    async fn try_acquire(&self, key: &ResourceTypeKey) -> Result<i64, GateError> {
        self.ensure_open()?;
        let mut records = self.records.lock();
        match records.get_mut(key) {
            Some(rec) if rec.has_capacity() => {
                rec.running_count += 1;
                Ok(rec.running_count)
            }
            _ => Err(GateError::QuotaExceeded(key.clone())),
        }
    }

    async fn release(&self, key: &ResourceTypeKey) -> Result<i64, GateError> {
        self.ensure_open()?;
        let mut records = self.records.lock();
        let rec = records
            .get_mut(key)
            .ok_or_else(|| GateError::UnknownResourceType(key.clone()))?;
        rec.running_count -= 1;
        Ok(rec.running_count)
    }

    async fn set_limit(
        &self,
        key: &ResourceTypeKey,
        limit: u32,
        reset_running: bool,
    ) -> Result<SemaphoreRecord, GateError> {
        self.ensure_open()?;
        let mut records = self.records.lock();
        let rec = records
            .entry(key.clone())
            .or_insert_with(|| SemaphoreRecord::new(key.clone(), limit));
        rec.limit = limit;
        if reset_running {
            rec.running_count = 0;
        }
        Ok(rec.clone())
    }

    async fn record(&self, key: &ResourceTypeKey) -> Result<Option<SemaphoreRecord>, GateError> {
        self.ensure_open()?;
        Ok(self.records.lock().get(key).cloned())
    }

    async fn snapshot(&self) -> Result<Vec<SemaphoreRecord>, GateError> {
        self.ensure_open()?;
        let mut all: Vec<_> = self.records.lock().values().cloned().collect();
        all.sort_by(|a, b| a.resource_type_key.cmp(&b.resource_type_key));
        Ok(all)
    }

    async fn shutdown(&self) -> Result<(), GateError> {
        self.closed.store(true, Ordering::Release);
        tracing::debug!("in-memory semaphore store shut down");
        Ok(())
    }
}
