//! # Task Lifecycle Events
//!
//! Every status change is reported twice: to the per-task [`UpdateHook`] given
//! at creation, and on a broadcast channel that any number of observers can
//! subscribe to through [`LifecyclePublisher`].

pub mod hook;
pub mod publisher;

pub use hook::{notify_safely, TracingHook, UpdateHook};
pub use publisher::{LifecycleEvent, LifecyclePublisher};
