//! # Data Models
//!
//! In-memory records describing a conversion task, its iterations and the table
//! produced by generated code. Nothing here is persisted; a task lives as long as
//! the process that owns it.

pub mod artifact;
pub mod iteration;
pub mod task;

pub use artifact::{ArtifactError, TableArtifact};
pub use iteration::IterationRecord;
pub use task::{TaskMetadata, TaskStatusReport, TaskSummary};
