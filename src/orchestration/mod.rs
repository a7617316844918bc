//! # Orchestration Engine
//!
//! Task lifecycle and the concurrency substrate it runs on.
//!
//! ## Architecture
//!
//! ```text
//! caller ──► TaskManager ──► WorkerPool thread ──► SchedulerCommand ──► TaskScheduler
//!                                                                        │ owns TaskRegistry
//!                                                                        ▼
//!                                              Task::run ──► IterationExecutor
//!                                                              ├── ModelClient
//!                                                              ├── CodeRunner
//!                                                              └── SpreadsheetWriter
//! ```
//!
//! - **TaskManager**: synchronous facade (create, start, status, cancel, feedback,
//!   delete, pause, resume, list, shutdown)
//! - **WorkerPool**: fixed pool of threads forwarding facade calls
//! - **TaskScheduler**: single command loop on a dedicated thread; the only
//!   place tasks are created, removed or have activities spawned
//! - **Task**: lifecycle state and the self-correction loop
//! - **IterationExecutor**: one generate/execute/export cycle and the history

pub mod bridge;
pub mod iteration_executor;
pub mod manager;
pub mod pool;
pub mod scheduler;
pub mod task;

pub use bridge::{SchedulerClient, SchedulerThread};
pub use iteration_executor::{
    Collaborators, ExecutionOutcome, ExportOutcome, GenerationOutcome, IterationExecutor,
};
pub use manager::TaskManager;
pub use pool::WorkerPool;
pub use scheduler::{SchedulerCommand, TaskScheduler};
pub use task::{Task, TaskRequest, TaskSettings};
