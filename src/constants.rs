//! # System Constants
//!
//! Operational defaults shared by configuration, the task loop and the bridge.

/// Iteration budget per task when the configuration does not override it
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Name of the binding generated code must leave its table in
pub const DEFAULT_OUTPUT_BINDING: &str = "df";

/// Pause between loop iterations, giving the scheduler room to interleave tasks
pub const DEFAULT_ITERATION_PAUSE_MS: u64 = 1000;

/// Size of the worker pool that forwards synchronous calls to the scheduler
pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// Capacity of the scheduler command channel
pub const DEFAULT_COMMAND_BUFFER_SIZE: usize = 64;

/// Directory spreadsheets are written to
pub const DEFAULT_OUTPUT_DIR: &str = "files/generated";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "IMAGE2SHEET";

/// Task lifecycle event names reported through logging
pub mod events {
    pub const TASK_CREATED: &str = "task.created";
    pub const TASK_INITIALIZING: &str = "task.initializing";
    pub const TASK_INITIALIZED: &str = "task.initialized";
    pub const TASK_STARTED: &str = "task.started";
    pub const TASK_PAUSED: &str = "task.paused";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_CANCELLED: &str = "task.cancelled";
    pub const TASK_DELETED: &str = "task.deleted";
}

/// Build a fresh task identifier of the form `task_1a2b3c4d`
pub fn new_task_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("task_{}", &hex[..8])
}

/// File name for the spreadsheet exported from an iteration
pub fn export_file_name(task_id: &str, iteration: u32) -> String {
    format!("{task_id}_iteration_{iteration}.xlsx")
}
