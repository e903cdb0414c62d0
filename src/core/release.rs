//! Release handler invoked once per finished execution.

use std::sync::Arc;

use crate::core::audit::{build_audit_event, record_to, AuditAction, AuditSink, SharedAuditSink};
use crate::core::{GateError, ReleaseEvent, SemaphoreStore};

/// Frees the slot held by a finished (successful or failed) execution.
///
/// There is no business-level failure here: any store error fails the invocation
/// so the caller's retry policy redelivers the event.
pub struct ReleaseController<S> {
    store: S,
    audit: Option<SharedAuditSink>,
}

impl<S: SemaphoreStore> ReleaseController<S> {
    /// Create a controller over `store`.
    pub const fn new(store: S) -> Self {
        Self { store, audit: None }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Arc::new(parking_lot::Mutex::new(audit)));
        self
    }

    /// Share an existing audit sink.
    #[must_use]
    pub fn with_shared_audit(mut self, audit: SharedAuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Release one slot for the event's resource type; returns the new count.
    pub async fn handle(&self, event: &ReleaseEvent) -> Result<i64, GateError> {
        let key = &event.resource_type_key;
        match self.store.release(key).await {
            Ok(count) => {
                if count < 0 {
                    tracing::error!("running count for {} dropped below zero ({})", key, count);
                }
                tracing::info!(
                    "released slot on {} (running={}, job={:?}, status={:?})",
                    key,
                    count,
                    event.job_id,
                    event.status
                );
                record_to(
                    self.audit.as_ref(),
                    build_audit_event(event.job_id.as_ref(), key, AuditAction::Released, Some(count), None),
                );
                Ok(count)
            }
            Err(e) => {
                tracing::error!("release failed on {}: {}", key, e);
                record_to(
                    self.audit.as_ref(),
                    build_audit_event(
                        event.job_id.as_ref(),
                        key,
                        AuditAction::ReleaseFailed,
                        None,
                        Some(e.to_string()),
                    ),
                );
                Err(GateError::Release {
                    key: key.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Parse a release event from JSON and handle it.
    pub async fn handle_json(&self, input: &str) -> Result<i64, GateError> {
        let event: ReleaseEvent = serde_json::from_str(input).map_err(|e| GateError::Parse {
            message_id: "release-event".into(),
            reason: e.to_string(),
        })?;
        self.handle(&event).await
    }
}
