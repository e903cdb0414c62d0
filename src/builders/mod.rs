//! Builders to construct gate components from configuration.

pub mod gate_builder;

pub use gate_builder::{build_store, Gate, GateBuilder, SharedStore};
