//! # Error Types
//!
//! Errors are grouped by the collaborator that raises them. Generation and
//! execution errors are recovered inside the task loop; export errors and budget
//! exhaustion end the task; bridge errors surface to synchronous callers.

use thiserror::Error;

pub use crate::config::ConfigurationError;
pub use crate::state_machine::StateMachineError;

/// Model client failures. Retried by the task until the iteration budget runs out.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Model endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Model endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Model returned no code")]
    EmptyCode,

    #[error("Model request timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Code runner failures. Retried with a correction prompt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Generated code raised an error:\n{diagnostic}")]
    Raised { diagnostic: String },

    #[error("Code finished without defining '{name}'")]
    MissingBinding { name: String },

    #[error("'{name}' is a {found}, expected a DataFrame")]
    WrongType { name: String, found: String },

    #[error("Code execution exceeded {seconds}s and was killed")]
    Timeout { seconds: u64 },

    #[error("Failed to start code runner: {0}")]
    Spawn(String),

    #[error("Code runner produced unreadable output: {0}")]
    InvalidOutput(String),

    #[error("Code runner output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("Iteration {iteration} is not in the task history")]
    UnknownIteration { iteration: u32 },
}

impl ExecutionError {
    /// True when the code ran to completion but left no usable table behind.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::MissingBinding { .. } | Self::WrongType { .. })
    }
}

/// Spreadsheet export failures. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("Iteration {iteration} has no table to export")]
    NoArtifact { iteration: u32 },

    #[error("Iteration {iteration} is not in the task history")]
    UnknownIteration { iteration: u32 },

    #[error("I/O error while exporting: {0}")]
    Io(String),

    #[error("Spreadsheet writer error: {0}")]
    Writer(String),
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failures of the synchronous bridge into the scheduler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Task scheduler is not running")]
    SchedulerUnavailable,

    #[error("Task scheduler dropped the response")]
    ResponseDropped,

    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("Failed to start scheduler thread: {0}")]
    Startup(String),

    #[error("Task scheduler thread panicked")]
    SchedulerPanicked,
}

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateMachineError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Initialization error: {0}")]
    Initialization(String),
}

pub type Result<T> = std::result::Result<T, ConverterError>;
