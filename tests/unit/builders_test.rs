//! Tests for builder modules

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus_quota_gate::builders::{build_store, GateBuilder};
use prometheus_quota_gate::config::{GateConfig, StoreBackendConfig};
use prometheus_quota_gate::core::{
    ExecutionHandle, GateError, JobSpec, LaunchOutcome, SemaphoreStore, WorkflowLauncher,
};
use prometheus_quota_gate::infra::store::InMemorySemaphoreStore;
use prometheus_quota_gate::util::ExecutionName;

struct NoopLauncher;

#[async_trait]
impl WorkflowLauncher for NoopLauncher {
    async fn start(&self, _job: &JobSpec, name: &ExecutionName) -> Result<LaunchOutcome, GateError> {
        Ok(LaunchOutcome::Started(ExecutionHandle {
            execution_id: format!("noop:{name}"),
            name: name.clone(),
            started_at_ms: 0,
        }))
    }
}

fn config() -> GateConfig {
    GateConfig::new("counters", "target", "jobs.fifo")
}

#[test]
fn test_gate_builder_keeps_config() {
    let builder = GateBuilder::new(config());
    assert_eq!(builder.config().table_name, "counters");
    assert_eq!(builder.config().batch_size, 10);
}

#[test]
fn test_gate_builder_rejects_invalid_config() {
    let mut invalid = config();
    invalid.batch_size = 0;
    let result = GateBuilder::new(invalid).build(NoopLauncher);
    assert!(matches!(result, Err(GateError::Config(_))));
}

#[test]
fn test_gate_retry_policy_from_config() {
    let mut cfg = config();
    cfg.release_max_attempts = 7;
    cfg.release_backoff_ms = 30;
    let gate = GateBuilder::new(cfg).build(NoopLauncher).unwrap();
    let policy = gate.retry_policy();
    assert_eq!(policy.max_attempts, 7);
    assert_eq!(policy.backoff, Duration::from_millis(30));
}

#[tokio::test]
async fn test_build_store_sqlite_backend_persists() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config();
    cfg.store = StoreBackendConfig::Sqlite {
        directory: dir.path().to_path_buf(),
    };

    let store = build_store(&cfg).unwrap();
    store.set_limit(&"cpu".into(), 2, true).await.unwrap();
    store.try_acquire(&"cpu".into()).await.unwrap();
    drop(store);

    let reopened = build_store(&cfg).unwrap();
    let record = reopened.record(&"cpu".into()).await.unwrap().unwrap();
    assert_eq!(record.running_count, 1);
    assert_eq!(record.limit, 2);
}

#[tokio::test]
async fn test_build_with_store_shares_one_store() {
    let store = Arc::new(InMemorySemaphoreStore::with_limits([("cpu", 1)]));
    let gate = GateBuilder::new(config())
        .build_with_store(store.clone(), NoopLauncher)
        .unwrap();

    let job = JobSpec::new("job-1", "cpu", serde_json::json!({}));
    let body = serde_json::to_string(&job).unwrap();
    let message = prometheus_quota_gate::core::QueueMessage::new("m-1", body);
    let outcome = gate.admission.handle_batch(&[message]).await.unwrap();
    assert_eq!(outcome.admitted.len(), 1);
    assert_eq!(store.record(&"cpu".into()).await.unwrap().unwrap().running_count, 1);

    gate.release
        .handle(&prometheus_quota_gate::core::ReleaseEvent::for_key("cpu"))
        .await
        .unwrap();
    assert_eq!(store.record(&"cpu".into()).await.unwrap().unwrap().running_count, 0);
}
