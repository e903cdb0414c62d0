//! Tests for audit sink

use prometheus_quota_gate::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};
use prometheus_quota_gate::util::{JobId, ResourceTypeKey};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    let job = JobId::new("job1");
    let key = ResourceTypeKey::new("ml.m5.large");

    let event = build_audit_event(Some(&job), &key, AuditAction::Admitted, Some(1), None);
    sink.record(event);
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].job_id, Some(job));
    assert_eq!(events[0].resource_type, key);
    assert_eq!(events[0].action, AuditAction::Admitted);
    assert_eq!(events[0].running_count, Some(1));
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);
    let key = ResourceTypeKey::new("cpu");

    for job in ["job1", "job2", "job3"] {
        let job = JobId::new(job);
        sink.record(build_audit_event(Some(&job), &key, AuditAction::Rejected, None, None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].job_id, Some(JobId::new("job2"))); // First one popped
    assert_eq!(events[1].job_id, Some(JobId::new("job3")));
}

#[test]
fn test_reader_sees_events_after_sink_is_boxed() {
    let sink = InMemoryAuditSink::new(10);
    let reader = sink.reader();
    let mut boxed: Box<dyn AuditSink> = Box::new(sink);
    let key = ResourceTypeKey::new("cpu");

    boxed.record(build_audit_event(None, &key, AuditAction::Released, Some(0), None));
    boxed.record(build_audit_event(None, &key, AuditAction::Released, Some(-1), None));
    boxed.record(build_audit_event(None, &key, AuditAction::ReleaseFailed, None, None));

    assert_eq!(reader.events().len(), 3);
    assert_eq!(reader.count(AuditAction::Released), 2);
    assert_eq!(reader.count(AuditAction::Admitted), 0);
}

#[test]
fn test_build_audit_event() {
    let key = ResourceTypeKey::new("ml.t3.medium");
    let event = build_audit_event(
        None,
        &key,
        AuditAction::Compensated,
        Some(0),
        Some("engine refused".to_string()),
    );

    assert!(event.event_id.starts_with("ml.t3.medium-compensated-"));
    assert_eq!(event.job_id, None);
    assert_eq!(event.action.to_string(), "compensated");
    assert_eq!(event.detail, Some("engine refused".to_string()));
    assert!(event.created_at_ms > 0);
}
