//! Runtime plumbing: wire models, consumer and release loops, and the tokio spawner.

pub mod api;
pub mod consumer;
pub mod release_loop;
pub mod tokio_spawner;

pub use api::{handle_batch_event, handle_release_event, BatchItemFailure, BatchResponse, QueueBatch};
pub use consumer::{BatchConsumer, ConsumerStats, PollResult};
pub use release_loop::{
    deliver_release, run_release_loop, run_release_loop_with, ReleaseStats, RetryPolicy,
};
pub use tokio_spawner::TokioSpawner;
