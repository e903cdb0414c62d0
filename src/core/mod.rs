//! Core admission protocol: semaphore abstraction, controllers, and their types.

pub mod admission;
pub mod audit;
pub mod error;
pub mod executor;
pub mod job;
pub mod launcher;
pub mod monitor;
pub mod quota;
pub mod release;
pub mod semaphore;

pub use admission::{Admission, AdmissionController, BatchOutcome};
pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditReader, AuditSink, InMemoryAuditSink,
    SharedAuditSink,
};
pub use error::{AppResult, GateError};
pub use executor::{JobRunner, Spawn};
pub use job::{ExecutionOutcome, JobSpec, QueueMessage, ReleaseEvent};
pub use launcher::{ExecutionHandle, ExecutionNaming, LaunchOutcome, WorkflowLauncher};
pub use monitor::{detect_leaks, LeakReport};
pub use quota::{seed_quotas, QuotaEntry, QuotaSource, StaticQuotaSource};
pub use release::ReleaseController;
pub use semaphore::{SemaphoreRecord, SemaphoreStore, TimeoutStore};
