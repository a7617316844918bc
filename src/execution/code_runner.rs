use async_trait::async_trait;

use crate::error::ExecutionError;
use crate::models::TableArtifact;

/// Result of a run that left a valid table in the output binding
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub artifact: TableArtifact,
    /// Whatever the code printed, trimmed to a bounded tail
    pub stdout: String,
}

/// Executes untrusted code and extracts the designated output binding.
///
/// Every call is independent: nothing defined by one run is visible to the next.
/// A missing binding or a binding of the wrong type is reported as
/// [`ExecutionError::MissingBinding`] / [`ExecutionError::WrongType`], never coerced.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str) -> Result<RunOutput, ExecutionError>;
}
