//! Quota seeding interface.
//!
//! Limits come from an external catalog (for example a cloud provider's service
//! quotas). The catalog client lives outside this crate behind [`QuotaSource`];
//! [`seed_quotas`] maps its entries onto semaphore records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{GateError, SemaphoreRecord, SemaphoreStore};
use crate::util::serde::ResourceTypeKey;

/// One quota as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaEntry {
    /// Human-readable quota name, e.g. `"ml.t3.medium for processing job usage"`.
    pub name: String,
    /// Quota value; fractional values are truncated.
    pub value: f64,
}

impl QuotaEntry {
    /// Resource type named by the quota: the first whitespace-separated token.
    pub fn resource_type(&self) -> Option<ResourceTypeKey> {
        self.name.split_whitespace().next().map(ResourceTypeKey::from)
    }

    /// The quota as a non-negative integer limit.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn limit(&self) -> u32 {
        if self.value.is_finite() && self.value > 0.0 {
            self.value.min(f64::from(u32::MAX)) as u32
        } else {
            0
        }
    }
}

/// External catalog listing quotas.
#[async_trait]
pub trait QuotaSource: Send + Sync {
    /// List every quota the catalog knows about.
    async fn list_quotas(&self) -> Result<Vec<QuotaEntry>, GateError>;
}

/// Quotas held in memory, for tests and static deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticQuotaSource {
    entries: Vec<QuotaEntry>,
}

impl StaticQuotaSource {
    /// Build from `(name, value)` pairs.
    pub fn new<I, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, f64)>,
        N: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, value)| QuotaEntry {
                    name: name.into(),
                    value,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl QuotaSource for StaticQuotaSource {
    async fn list_quotas(&self) -> Result<Vec<QuotaEntry>, GateError> {
        Ok(self.entries.clone())
    }
}

/// Seed limits from `source` into `store`.
///
/// Entries whose name does not contain `name_filter` are skipped. Each seeded
/// record gets the quota as its limit and a running count of zero, so seeding must
/// only run while no jobs of the seeded types are admitted.
pub async fn seed_quotas<Q, S>(
    source: &Q,
    store: &S,
    name_filter: &str,
) -> Result<Vec<SemaphoreRecord>, GateError>
where
    Q: QuotaSource + ?Sized,
    S: SemaphoreStore + ?Sized,
{
    let mut seeded = Vec::new();
    for entry in source.list_quotas().await? {
        if !entry.name.contains(name_filter) {
            continue;
        }
        let Some(key) = entry.resource_type() else {
            continue;
        };
        let record = store.set_limit(&key, entry.limit(), true).await?;
        tracing::info!("seeded {} with limit {}", record.resource_type_key, record.limit);
        seeded.push(record);
    }
    Ok(seeded)
}
