//! Workflow engine adapters.

pub mod local;

pub use local::{ExecutionRecord, ExecutionStatus, LocalWorkflowEngine};
