//! # Prometheus Quota Gate
//!
//! Admission control for queued jobs under per-resource-type concurrency quotas.
//!
//! Jobs arrive in batches from an at-least-once queue. Before a job may start, a
//! slot must be acquired for its resource type from a [`core::SemaphoreStore`]: a
//! consistent key-value store holding `running_count` and `limit` per type, which
//! increments the count only if `running_count < limit` holds on the store side.
//! That single conditional update is the whole synchronization story; any number
//! of consumers in any number of processes can race on the same key without
//! exceeding the limit.
//!
//! ## Flow
//!
//! ```text
//! queue ─▶ AdmissionController ─▶ SemaphoreStore::try_acquire
//!                                   │ ok                 │ quota exceeded
//!                                   ▼                    ▼
//!                          WorkflowLauncher::start   reported as batch item failure
//!                                   │                    (redelivered later)
//!                                   ▼
//!                        execution reaches a terminal state
//!                                   │
//!                                   ▼
//!                 ReleaseController ─▶ SemaphoreStore::release
//! ```
//!
//! ## Failure behavior
//!
//! - Quota rejections are normal: the message id is returned in the partial batch
//!   failure response and the queue redelivers it.
//! - Any other store error aborts the batch; the queue redelivers all of it.
//! - A launch failure after a successful acquire releases the slot again before
//!   the error propagates.
//! - Release failures fail the release invocation so it gets retried.
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_quota_gate::builders::GateBuilder;
//! use prometheus_quota_gate::config::GateConfig;
//! use prometheus_quota_gate::infra::{InMemoryJobQueue, LocalWorkflowEngine};
//! use prometheus_quota_gate::runtime::{run_release_loop_with, TokioSpawner};
//!
//! let config = GateConfig::from_env()?;
//! let (engine, completions) = LocalWorkflowEngine::new(
//!     config.workflow_target.clone(),
//!     my_runner,
//!     TokioSpawner::current(),
//! );
//! let engine = Arc::new(engine);
//! let gate = GateBuilder::new(config).build(Arc::clone(&engine))?;
//! tokio::spawn(run_release_loop_with(
//!     completions,
//!     gate.release.clone(),
//!     gate.retry_policy(),
//!     move |event, _| {
//!         engine.settle_release(event);
//!     },
//! ));
//!
//! let queue = Arc::new(Mutex::new(InMemoryJobQueue::new(10_000)));
//! let stats = gate.consumer("consumer-0", queue).run(shutdown_rx).await;
//! gate.shutdown().await?;
//! ```
//!
//! For complete scenarios, see `tests/admission_protocol_test.rs` and
//! `tests/end_to_end_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core admission protocol, semaphore abstraction, and error types.
pub mod core;
/// Configuration models for the store, engine target, and queue.
pub mod config;
/// Builders to construct gate components from configuration.
pub mod builders;
/// Infrastructure adapters for stores, queues, and the workflow engine.
pub mod infra;
/// Runtime loops, wire models, and the tokio spawner.
pub mod runtime;
/// Shared utilities.
pub mod util;
