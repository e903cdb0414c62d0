//! Semaphore store backends.

pub mod memory;
pub mod sqlite;

pub use memory::InMemorySemaphoreStore;
pub use sqlite::SqliteSemaphoreStore;
