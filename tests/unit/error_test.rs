//! Tests for error types

use prometheus_quota_gate::core::GateError;
use prometheus_quota_gate::util::{JobId, MessageId, ResourceTypeKey};

#[test]
fn test_quota_exceeded_error() {
    let err = GateError::QuotaExceeded(ResourceTypeKey::new("ml.m5.large"));
    assert_eq!(format!("{}", err), "quota exceeded for resource type ml.m5.large");
    assert!(err.is_quota_exceeded());
}

#[test]
fn test_parse_error() {
    let err = GateError::Parse {
        message_id: MessageId::new("m-1"),
        reason: "missing field `JobId`".to_string(),
    };
    assert_eq!(format!("{}", err), "malformed message m-1: missing field `JobId`");
    assert!(!err.is_quota_exceeded());
}

#[test]
fn test_workflow_start_error() {
    let err = GateError::WorkflowStart {
        job_id: JobId::new("job-7"),
        reason: "throttled".to_string(),
    };
    assert_eq!(format!("{}", err), "workflow start failed for job job-7: throttled");
}

#[test]
fn test_release_error() {
    let err = GateError::Release {
        key: ResourceTypeKey::new("cpu"),
        reason: "store unavailable: timed out".to_string(),
    };
    assert_eq!(
        format!("{}", err),
        "release failed for resource type cpu: store unavailable: timed out"
    );
}

#[test]
fn test_store_error_converts_to_anyhow() {
    let result: prometheus_quota_gate::core::AppResult<()> =
        Err(GateError::StoreUnavailable("connection reset".to_string()).into());
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "store unavailable: connection reset");
    assert!(err.downcast_ref::<GateError>().is_some());
}
