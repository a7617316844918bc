use serde::{Deserialize, Serialize};

use super::artifact::TableArtifact;

/// One generate/execute cycle of a task.
///
/// Created once code has been generated; afterwards only the outcome fields are
/// filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based, unique within a task
    pub iteration_number: u32,
    pub generated_code: String,
    pub execution_output: Option<String>,
    pub error_message: Option<String>,
    pub user_feedback: Option<String>,
    pub artifact: Option<TableArtifact>,
}

impl IterationRecord {
    pub fn new(iteration_number: u32, generated_code: impl Into<String>) -> Self {
        Self {
            iteration_number,
            generated_code: generated_code.into(),
            execution_output: None,
            error_message: None,
            user_feedback: None,
            artifact: None,
        }
    }

    pub fn has_artifact(&self) -> bool {
        self.artifact.is_some()
    }
}
