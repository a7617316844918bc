//! # Iteration Executor
//!
//! Runs the individual steps of one task's generate/execute/export cycle and
//! keeps the iteration history those steps produce. The executor never decides
//! whether to retry; it reports an outcome and the owning task chooses what to
//! do next.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::ModelClient;
use crate::error::{ExecutionError, ExportError, GenerationError};
use crate::execution::CodeRunner;
use crate::export::SpreadsheetWriter;
use crate::models::IterationRecord;
use crate::prompts::{self, EncodedImage, UserPrompt};

/// The three external capabilities a task depends on
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn ModelClient>,
    pub runner: Arc<dyn CodeRunner>,
    pub writer: Arc<dyn SpreadsheetWriter>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Outcome of `generate_code`
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    CodeGenerated { iteration: u32 },
    Failed(GenerationError),
}

/// Outcome of `execute_code`
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success { summary: String },
    /// The code ran but left no table of the expected shape behind
    Ambiguous(ExecutionError),
    Failed(ExecutionError),
}

/// Outcome of `export_artifact`
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Success(PathBuf),
    Failed(ExportError),
}

impl GenerationOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::CodeGenerated { iteration } => {
                format!("Code generated for iteration {iteration}")
            }
            Self::Failed(err) => format!("Code generation failed: {err}"),
        }
    }
}

impl ExecutionOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Success { summary } => format!("Execution succeeded: {summary}"),
            Self::Ambiguous(err) => format!("Execution produced no usable table: {err}"),
            Self::Failed(err) => format!("Execution failed: {err}"),
        }
    }
}

impl ExportOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Success(path) => format!("Spreadsheet written to {}", path.display()),
            Self::Failed(err) => format!("Export failed: {err}"),
        }
    }
}

/// Prompt inputs fixed at initialization
#[derive(Debug, Clone)]
struct PreparedPrompts {
    system_prompt: String,
    image: Option<EncodedImage>,
}

/// Per-task executor holding the iteration history
pub struct IterationExecutor {
    task_id: String,
    output_binding: String,
    collaborators: Collaborators,
    prepared: Mutex<Option<PreparedPrompts>>,
    history: Mutex<BTreeMap<u32, IterationRecord>>,
}

impl IterationExecutor {
    pub fn new(
        task_id: impl Into<String>,
        output_binding: impl Into<String>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            output_binding: output_binding.into(),
            collaborators,
            prepared: Mutex::new(None),
            history: Mutex::new(BTreeMap::new()),
        }
    }

    /// Fix the system prompt and the image sent with every request
    pub fn prepare(&self, system_prompt: String, image: Option<EncodedImage>) {
        *self.prepared.lock() = Some(PreparedPrompts {
            system_prompt,
            image,
        });
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.lock().is_some()
    }

    /// Request text for `iteration`: the initial prompt for the first one, a
    /// correction built from the latest record for every later one.
    pub fn prompt_for(&self, iteration: u32) -> String {
        if iteration > 1 {
            if let Some(latest) = self.history.lock().values().next_back() {
                return prompts::build_correction_prompt(latest, &self.output_binding);
            }
        }
        prompts::initial_user_prompt(&self.output_binding)
    }

    /// Ask the model for code and record it as `iteration`.
    ///
    /// Nothing is recorded when generation fails.
    pub async fn generate_code(&self, iteration: u32, prompt: &str) -> GenerationOutcome {
        let Some(prepared) = self.prepared.lock().clone() else {
            return GenerationOutcome::Failed(GenerationError::InvalidResponse(
                "task has not been initialized".to_string(),
            ));
        };
        if self.history.lock().contains_key(&iteration) {
            warn!(task_id = %self.task_id, iteration, "Iteration already has generated code");
            return GenerationOutcome::Failed(GenerationError::InvalidResponse(format!(
                "iteration {iteration} already recorded"
            )));
        }

        let user_prompt = UserPrompt {
            text: prompt.to_string(),
            image: prepared.image,
        };

        debug!(task_id = %self.task_id, iteration, "🧠 GENERATE: Requesting code");
        match self
            .collaborators
            .model
            .generate(&prepared.system_prompt, &user_prompt)
            .await
        {
            Ok(generated) if generated.code.trim().is_empty() => {
                GenerationOutcome::Failed(GenerationError::EmptyCode)
            }
            Ok(generated) => {
                self.history
                    .lock()
                    .insert(iteration, IterationRecord::new(iteration, generated.code));
                info!(
                    task_id = %self.task_id,
                    iteration,
                    completion_id = ?generated.completion_id,
                    "🧠 GENERATE: Code generated"
                );
                GenerationOutcome::CodeGenerated { iteration }
            }
            Err(err) => {
                warn!(task_id = %self.task_id, iteration, error = %err, "🧠 GENERATE: Failed");
                GenerationOutcome::Failed(err)
            }
        }
    }

    /// Run the code recorded for `iteration` and store the result on its record
    pub async fn execute_code(&self, iteration: u32) -> ExecutionOutcome {
        let code = match self.history.lock().get(&iteration) {
            Some(record) => record.generated_code.clone(),
            None => {
                return ExecutionOutcome::Failed(ExecutionError::UnknownIteration { iteration })
            }
        };

        debug!(task_id = %self.task_id, iteration, "▶️ EXECUTE: Running generated code");
        let result = self.collaborators.runner.run(&code).await;

        let mut history = self.history.lock();
        let Some(record) = history.get_mut(&iteration) else {
            return ExecutionOutcome::Failed(ExecutionError::UnknownIteration { iteration });
        };

        match result {
            Ok(output) => {
                let summary = output.artifact.summary();
                record.execution_output = Some(if output.stdout.trim().is_empty() {
                    summary.clone()
                } else {
                    format!("{summary}\n{}", output.stdout.trim_end())
                });
                record.artifact = Some(output.artifact);
                info!(task_id = %self.task_id, iteration, %summary, "▶️ EXECUTE: Succeeded");
                ExecutionOutcome::Success { summary }
            }
            Err(err) => {
                record.error_message = Some(err.to_string());
                warn!(task_id = %self.task_id, iteration, error = %err, "▶️ EXECUTE: Failed");
                if err.is_ambiguous() {
                    ExecutionOutcome::Ambiguous(err)
                } else {
                    ExecutionOutcome::Failed(err)
                }
            }
        }
    }

    /// Write the table of `iteration` to `destination`
    pub async fn export_artifact(&self, iteration: u32, destination: &Path) -> ExportOutcome {
        let artifact = match self.history.lock().get(&iteration) {
            Some(record) => record.artifact.clone(),
            None => return ExportOutcome::Failed(ExportError::UnknownIteration { iteration }),
        };
        let Some(artifact) = artifact else {
            return ExportOutcome::Failed(ExportError::NoArtifact { iteration });
        };

        match self.collaborators.writer.write(&artifact, destination).await {
            Ok(path) => {
                info!(task_id = %self.task_id, iteration, path = %path.display(), "📤 EXPORT: Written");
                ExportOutcome::Success(path)
            }
            Err(err) => {
                warn!(task_id = %self.task_id, iteration, error = %err, "📤 EXPORT: Failed");
                ExportOutcome::Failed(err)
            }
        }
    }

    /// Attach feedback to a recorded iteration. Returns false if it is unknown.
    pub fn record_feedback(&self, iteration: u32, feedback: impl Into<String>) -> bool {
        match self.history.lock().get_mut(&iteration) {
            Some(record) => {
                record.user_feedback = Some(feedback.into());
                true
            }
            None => false,
        }
    }

    pub fn record(&self, iteration: u32) -> Option<IterationRecord> {
        self.history.lock().get(&iteration).cloned()
    }

    /// Records in iteration order
    pub fn history(&self) -> Vec<IterationRecord> {
        self.history.lock().values().cloned().collect()
    }
}
