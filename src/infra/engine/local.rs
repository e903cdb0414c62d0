//! In-process workflow engine.
//!
//! Starts executions on a [`Spawn`] implementation, dedupes them by name, and
//! reports every terminal state as a [`ReleaseEvent`] on an unbounded channel.
//! Hosts drain that channel into the release controller
//! (see [`crate::runtime::release_loop`]) and hand each settled event back through
//! [`LocalWorkflowEngine::settle_release`]. An execution counts as live until then,
//! so its slot and its execution are never seen apart by the leak monitor.
//!
//! Settled executions stay in the dedupe table up to a retention bound; the
//! oldest are forgotten first.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::core::{
    ExecutionHandle, ExecutionOutcome, GateError, JobRunner, JobSpec, LaunchOutcome, ReleaseEvent,
    Spawn, WorkflowLauncher,
};
use crate::util::clock::now_ms;
use crate::util::serde::{ExecutionName, JobId, ResourceTypeKey};

/// Lifecycle state of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Started and not yet finished.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed(String),
}

/// Engine-side view of one execution.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// Handle returned to the launcher's caller.
    pub handle: ExecutionHandle,
    /// Job being executed.
    pub job_id: JobId,
    /// Resource type whose slot the execution holds.
    pub resource_type_key: ResourceTypeKey,
    /// Current state.
    pub status: ExecutionStatus,
    /// The release for this execution has been applied or given up on.
    pub release_settled: bool,
}

/// Settled executions remembered for deduplication by default.
pub const DEFAULT_RETAINED_EXECUTIONS: usize = 10_000;

#[derive(Default)]
struct Executions {
    by_name: HashMap<ExecutionName, ExecutionRecord>,
    settled: VecDeque<ExecutionName>,
}

impl Executions {
    /// Mark a finished execution settled, then forget the oldest settled ones
    /// beyond `retain`.
    fn settle(&mut self, name: &ExecutionName, retain: usize) -> bool {
        let Some(rec) = self.by_name.get_mut(name) else {
            return false;
        };
        if rec.release_settled || rec.status == ExecutionStatus::Running {
            return false;
        }
        rec.release_settled = true;
        self.settled.push_back(name.clone());
        while self.settled.len() > retain {
            if let Some(oldest) = self.settled.pop_front() {
                self.by_name.remove(&oldest);
            }
        }
        true
    }
}

type ExecutionTable = Arc<Mutex<Executions>>;

/// Workflow engine running jobs inside this process.
pub struct LocalWorkflowEngine<R, S> {
    target: String,
    runner: R,
    spawner: S,
    executions: ExecutionTable,
    completions: mpsc::UnboundedSender<ReleaseEvent>,
    accepting: AtomicBool,
    retain_settled: usize,
}

impl<R, S> LocalWorkflowEngine<R, S>
where
    R: JobRunner,
    S: Spawn + Send + Sync,
{
    /// Create an engine identified by `target`. The receiver yields one release
    /// event per finished execution.
    pub fn new(
        target: impl Into<String>,
        runner: R,
        spawner: S,
    ) -> (Self, mpsc::UnboundedReceiver<ReleaseEvent>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let engine = Self {
            target: target.into(),
            runner,
            spawner,
            executions: Arc::new(Mutex::new(Executions::default())),
            completions,
            accepting: AtomicBool::new(true),
            retain_settled: DEFAULT_RETAINED_EXECUTIONS,
        };
        (engine, rx)
    }

    /// Remember at most `retain` settled executions for deduplication.
    #[must_use]
    pub const fn with_retention(mut self, retain: usize) -> Self {
        self.retain_settled = retain;
        self
    }

    /// Refuse (`false`) or accept (`true`) new executions.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
    }

    /// Look up an execution by name.
    pub fn execution(&self, name: &ExecutionName) -> Option<ExecutionRecord> {
        self.executions.lock().by_name.get(name).cloned()
    }

    /// Executions holding a slot, per resource type: running, or finished with
    /// the release not yet settled.
    pub fn live_by_resource(&self) -> HashMap<ResourceTypeKey, usize> {
        let mut counts = HashMap::new();
        for rec in self.executions.lock().by_name.values() {
            if !rec.release_settled {
                *counts.entry(rec.resource_type_key.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Executions started and still remembered.
    pub fn started(&self) -> usize {
        self.executions.lock().by_name.len()
    }

    /// Record that the release for `event`'s execution was applied or given up on.
    /// Returns `false` for events naming no finished, unsettled execution.
    pub fn settle_release(&self, event: &ReleaseEvent) -> bool {
        event.execution_name.as_ref().is_some_and(|name| {
            self.executions.lock().settle(name, self.retain_settled)
        })
    }

    /// Drop every settled execution from the dedupe table; returns how many were removed.
    pub fn forget_finished(&self) -> usize {
        let mut table = self.executions.lock();
        let before = table.by_name.len();
        table.by_name.retain(|_, rec| !rec.release_settled);
        table.settled.clear();
        before - table.by_name.len()
    }

    fn execution_id(&self, name: &ExecutionName) -> String {
        format!("{}:{}", self.target, name)
    }
}

#[async_trait]
impl<R, S> WorkflowLauncher for LocalWorkflowEngine<R, S>
where
    R: JobRunner,
    S: Spawn + Send + Sync,
{
    async fn start(&self, job: &JobSpec, name: &ExecutionName) -> Result<LaunchOutcome, GateError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(GateError::WorkflowStart {
                job_id: job.job_id.clone(),
                reason: format!("engine {} is not accepting executions", self.target),
            });
        }

        let handle = {
            let mut table = self.executions.lock();
            if let Some(existing) = table.by_name.get(name) {
                return Ok(LaunchOutcome::AlreadyStarted(existing.handle.clone()));
            }
            let handle = ExecutionHandle {
                execution_id: self.execution_id(name),
                name: name.clone(),
                started_at_ms: now_ms(),
            };
            table.by_name.insert(
                name.clone(),
                ExecutionRecord {
                    handle: handle.clone(),
                    job_id: job.job_id.clone(),
                    resource_type_key: job.resource_type_key.clone(),
                    status: ExecutionStatus::Running,
                    release_settled: false,
                },
            );
            handle
        };

        let runner = self.runner.clone();
        let executions = Arc::clone(&self.executions);
        let completions = self.completions.clone();
        let retain = self.retain_settled;
        let job = job.clone();
        let name = name.clone();
        self.spawner.spawn(async move {
            tracing::debug!("execution {} running job {}", name, job.job_id);
            let result = runner.run(job.clone(), name.clone()).await;
            let (status, outcome) = match result {
                Ok(()) => (ExecutionStatus::Succeeded, ExecutionOutcome::Succeeded),
                Err(reason) => {
                    tracing::warn!("execution {} failed: {}", name, reason);
                    (ExecutionStatus::Failed(reason), ExecutionOutcome::Failed)
                }
            };
            if let Some(rec) = executions.lock().by_name.get_mut(&name) {
                rec.status = status;
            }
            if completions
                .send(ReleaseEvent::finished(&job, name.clone(), outcome))
                .is_err()
            {
                tracing::error!(
                    "no release listener for execution {}; slot on {} is leaked",
                    name,
                    job.resource_type_key
                );
                // Nobody will release it, so stop counting the execution as live.
                executions.lock().settle(&name, retain);
            }
        });

        tracing::info!("started execution {}", handle.execution_id);
        Ok(LaunchOutcome::Started(handle))
    }
}
