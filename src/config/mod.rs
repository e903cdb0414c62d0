//! Configuration models for the store, engine target, queue, and timeouts.

pub mod gate;

pub use gate::{GateConfig, StoreBackendConfig};
