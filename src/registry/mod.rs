//! # Registry
//!
//! In-memory ownership map of conversion tasks. There is no process-wide
//! registry: the scheduler creates one and is its only user.

pub mod task_registry;

pub use task_registry::{RegistryStats, TaskEntry, TaskRegistry};
