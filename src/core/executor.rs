//! Job execution and spawning abstractions used by the in-process engine.

use std::future::Future;

use async_trait::async_trait;

use crate::core::JobSpec;
use crate::util::serde::ExecutionName;

/// Runs the body of an admitted job.
///
/// The gate never runs jobs itself; a `JobRunner` is what an in-process engine
/// calls once an execution has been started.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_quota_gate::core::{JobRunner, JobSpec};
/// use prometheus_quota_gate::util::ExecutionName;
///
/// #[derive(Clone)]
/// struct SleepRunner;
///
/// #[async_trait]
/// impl JobRunner for SleepRunner {
///     async fn run(&self, job: JobSpec, _name: ExecutionName) -> Result<(), String> {
///         tokio::time::sleep(std::time::Duration::from_millis(5)).await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobRunner: Send + Sync + Clone + 'static {
    /// Execute the job. `Err` marks the execution as failed; the slot is released
    /// either way.
    async fn run(&self, job: JobSpec, execution: ExecutionName) -> Result<(), String>;
}

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
