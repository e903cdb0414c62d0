//! Infrastructure adapters for semaphore stores, the job queue, and the workflow engine.

pub mod engine;
pub mod queue;
pub mod store;

pub use engine::LocalWorkflowEngine;
pub use queue::InMemoryJobQueue;
pub use store::{InMemorySemaphoreStore, SqliteSemaphoreStore};
