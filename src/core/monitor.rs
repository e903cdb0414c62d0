//! Leak detection.
//!
//! A slot that was acquired but never released shows up as a `running_count`
//! higher than the number of executions actually alive for that type. This core
//! never heals that state; it only reports it.

use std::collections::HashMap;

use serde::Serialize;

use crate::core::SemaphoreRecord;
use crate::util::serde::ResourceTypeKey;

/// A resource type whose counter disagrees with the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakReport {
    /// Affected resource type.
    pub resource_type_key: ResourceTypeKey,
    /// Counter value in the store.
    pub running_count: i64,
    /// Executions the engine reports as holding a slot.
    pub live_executions: usize,
}

impl LeakReport {
    /// Slots held with no execution behind them; negative after a double release.
    pub fn leaked(&self) -> i64 {
        self.running_count - i64::try_from(self.live_executions).unwrap_or(i64::MAX)
    }
}

/// Compare store records against live executions per resource type.
///
/// Reports every key with more held slots than live executions, and every key
/// whose counter went negative. `live` must count an execution until its release
/// has settled (see `LocalWorkflowEngine::live_by_resource`). Admissions between
/// acquire and start are not visible to the engine and can still over-report.
pub fn detect_leaks(
    records: &[SemaphoreRecord],
    live: &HashMap<ResourceTypeKey, usize>,
) -> Vec<LeakReport> {
    records
        .iter()
        .filter_map(|rec| {
            let live_executions = live.get(&rec.resource_type_key).copied().unwrap_or(0);
            let report = LeakReport {
                resource_type_key: rec.resource_type_key.clone(),
                running_count: rec.running_count,
                live_executions,
            };
            (rec.running_count < 0 || report.leaked() > 0).then_some(report)
        })
        .inspect(|r| {
            tracing::warn!(
                "possible slot leak on {}: running_count={} live={}",
                r.resource_type_key,
                r.running_count,
                r.live_executions
            );
        })
        .collect()
}
