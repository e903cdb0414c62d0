//! Tests for configuration validation

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use prometheus_quota_gate::config::{GateConfig, StoreBackendConfig};
use prometheus_quota_gate::core::ExecutionNaming;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

const REQUIRED: [(&str, &str); 3] = [
    ("TABLE_NAME", "ResourceSemaphores"),
    ("STATE_MACHINE_ARN", "arn:aws:states:us-east-1:123:stateMachine:jobs"),
    ("QUEUE_NAME", "jobs.fifo"),
];

#[test]
fn test_gate_config_defaults() {
    let config = GateConfig::new("counters", "target", "queue");
    assert!(config.validate().is_ok());
    assert_eq!(config.store, StoreBackendConfig::InMemory);
    assert_eq!(config.batch_size, 10);
    assert_eq!(config.store_timeout(), Duration::from_secs(2));
    assert_eq!(config.execution_naming, ExecutionNaming::Random);
    assert_eq!(config.max_receive_count, None);
    assert!(config.consumer_count > 0);
}

#[test]
fn test_gate_config_invalid_table_name() {
    let invalid = GateConfig::new("  ", "target", "queue");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_gate_config_invalid_batch_size() {
    let mut invalid = GateConfig::new("counters", "target", "queue");
    invalid.batch_size = 0;
    assert!(invalid.validate().is_err());
}

#[test]
fn test_gate_config_invalid_timeout() {
    let mut invalid = GateConfig::new("counters", "target", "queue");
    invalid.store_timeout_ms = 0;
    assert!(invalid.validate().is_err());
}

#[test]
fn test_gate_config_invalid_receive_count() {
    let mut invalid = GateConfig::new("counters", "target", "queue");
    invalid.max_receive_count = Some(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_gate_config_from_json() {
    let json = r#"{
        "store": { "kind": "sqlite", "directory": "/var/lib/quota-gate" },
        "table_name": "ResourceSemaphores",
        "workflow_target": "jobs-state-machine",
        "queue_name": "jobs.fifo",
        "batch_size": 5,
        "execution_naming": "deterministic",
        "consumer_count": 2
    }"#;

    let config = GateConfig::from_json_str(json).unwrap();
    assert_eq!(
        config.store,
        StoreBackendConfig::Sqlite {
            directory: PathBuf::from("/var/lib/quota-gate")
        }
    );
    assert_eq!(config.batch_size, 5);
    assert_eq!(config.execution_naming, ExecutionNaming::Deterministic);
    assert_eq!(config.release_max_attempts, 5);
    assert_eq!(config.release_backoff(), Duration::from_millis(100));
}

#[test]
fn test_gate_config_from_json_rejects_invalid() {
    let json = r#"{
        "store": { "kind": "in_memory" },
        "table_name": "",
        "workflow_target": "t",
        "queue_name": "q"
    }"#;
    assert!(GateConfig::from_json_str(json).is_err());
}

#[test]
fn test_gate_config_from_lookup_required_only() {
    let config = GateConfig::from_lookup(env(&REQUIRED)).unwrap();
    assert_eq!(config.table_name, "ResourceSemaphores");
    assert_eq!(config.queue_name, "jobs.fifo");
    assert_eq!(config.store, StoreBackendConfig::InMemory);
}

#[test]
fn test_gate_config_from_lookup_missing_required() {
    let err = GateConfig::from_lookup(env(&REQUIRED[..2])).unwrap_err();
    assert!(err.contains("QUEUE_NAME"));
}

#[test]
fn test_gate_config_from_lookup_optional() {
    let mut vars = REQUIRED.to_vec();
    vars.extend([
        ("STORE_DIR", "/tmp/gate"),
        ("BATCH_SIZE", "3"),
        ("STORE_TIMEOUT_MS", "250"),
        ("EXECUTION_NAMING", "deterministic"),
        ("MAX_RECEIVE_COUNT", "4"),
    ]);
    let config = GateConfig::from_lookup(env(&vars)).unwrap();
    assert!(matches!(config.store, StoreBackendConfig::Sqlite { .. }));
    assert_eq!(config.batch_size, 3);
    assert_eq!(config.store_timeout(), Duration::from_millis(250));
    assert_eq!(config.execution_naming, ExecutionNaming::Deterministic);
    assert_eq!(config.max_receive_count, Some(4));
}

#[test]
fn test_gate_config_from_lookup_bad_values() {
    let mut vars = REQUIRED.to_vec();
    vars.push(("BATCH_SIZE", "ten"));
    assert!(GateConfig::from_lookup(env(&vars)).is_err());

    let mut vars = REQUIRED.to_vec();
    vars.push(("EXECUTION_NAMING", "sequential"));
    assert!(GateConfig::from_lookup(env(&vars)).is_err());
}
