//! Audit trail for admission and release decisions.
//!
//! Slot leaks are only detectable from the outside, so every acquire, rejection,
//! compensation, and release is recorded to an optional sink.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::util::clock::now_ms;
use crate::util::serde::{JobId, ResourceTypeKey};

/// What happened to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Slot acquired and execution started.
    Admitted,
    /// Acquire refused by quota; message returned for redelivery.
    Rejected,
    /// Slot released again because the launch failed.
    Compensated,
    /// Slot released again because the execution already existed.
    Deduplicated,
    /// Slot released after the execution finished.
    Released,
    /// Release could not be applied; the slot may be leaked.
    ReleaseFailed,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Admitted => "admitted",
            Self::Rejected => "rejected",
            Self::Compensated => "compensated",
            Self::Deduplicated => "deduplicated",
            Self::Released => "released",
            Self::ReleaseFailed => "release_failed",
        };
        f.write_str(s)
    }
}

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related job, when known (release events may carry only the key).
    pub job_id: Option<JobId>,
    /// Resource type whose slot was touched.
    pub resource_type: ResourceTypeKey,
    /// Action taken.
    pub action: AuditAction,
    /// `running_count` after the action, when the store reported one.
    pub running_count: Option<i64>,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Shared handle to a sink, as held by the controllers.
pub type SharedAuditSink = Arc<Mutex<Box<dyn AuditSink>>>;

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// A reader sharing this sink's buffer, usable after the sink is boxed.
    pub fn reader(&self) -> AuditReader {
        AuditReader {
            events: Arc::clone(&self.events),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Read-only view over an [`InMemoryAuditSink`] buffer.
#[derive(Clone)]
pub struct AuditReader {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
}

impl AuditReader {
    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Count events with the given action.
    pub fn count(&self, action: AuditAction) -> usize {
        self.events.lock().iter().filter(|e| e.action == action).count()
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    job_id: Option<&JobId>,
    resource_type: &ResourceTypeKey,
    action: AuditAction,
    running_count: Option<i64>,
    detail: Option<String>,
) -> AuditEvent {
    let created_at_ms = now_ms();
    let subject = job_id.map_or(resource_type.as_str(), JobId::as_str);
    AuditEvent {
        event_id: format!("{subject}-{action}-{created_at_ms}"),
        job_id: job_id.cloned(),
        resource_type: resource_type.clone(),
        action,
        running_count,
        created_at_ms,
        detail,
    }
}

/// Record into an optional shared sink.
pub(crate) fn record_to(sink: Option<&SharedAuditSink>, event: AuditEvent) {
    if let Some(sink) = sink {
        sink.lock().record(event);
    }
}
