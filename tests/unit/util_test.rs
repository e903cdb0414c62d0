//! Tests for utility functions

use prometheus_quota_gate::util::{now_ms, ExecutionName, JobId, ResourceTypeKey};

#[test]
fn test_identifiers_serialize_transparently() {
    let key = ResourceTypeKey::new("ml.m5.large");
    assert_eq!(serde_json::to_string(&key).unwrap(), "\"ml.m5.large\"");
    let back: ResourceTypeKey = serde_json::from_str("\"ml.m5.large\"").unwrap();
    assert_eq!(back, key);
}

#[test]
fn test_identifier_conversions() {
    let from_str: JobId = "job-1".into();
    let from_string: JobId = String::from("job-1").into();
    assert_eq!(from_str, from_string);
    assert_eq!(from_str.as_str(), "job-1");
    assert_eq!(ExecutionName::new("exec").to_string(), "exec");
}

#[test]
fn test_identifier_ordering() {
    let mut keys = vec![ResourceTypeKey::new("gpu"), ResourceTypeKey::new("cpu")];
    keys.sort();
    assert_eq!(keys[0].as_str(), "cpu");
}

#[test]
fn test_now_ms_advances() {
    let a = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > a);
}

#[test]
fn test_init_tracing_is_idempotent() {
    prometheus_quota_gate::util::init_tracing();
    prometheus_quota_gate::util::init_tracing();
    tracing::info!("tracing initialized");
}
