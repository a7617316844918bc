//! Scripted collaborators for driving the task loop deterministically.

use async_trait::async_trait;
use image2sheet_core::client::{GeneratedCode, ModelClient};
use image2sheet_core::error::{ExecutionError, ExportError, GenerationError};
use image2sheet_core::events::UpdateHook;
use image2sheet_core::execution::{CodeRunner, RunOutput};
use image2sheet_core::export::SpreadsheetWriter;
use image2sheet_core::models::TableArtifact;
use image2sheet_core::orchestration::Collaborators;
use image2sheet_core::prompts::UserPrompt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Holds a collaborator call open until the test releases it
#[derive(Debug)]
pub struct Gate {
    entered: AtomicUsize,
    release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: AtomicUsize::new(0),
            release: Semaphore::new(0),
        })
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Let one held (or future) call proceed
    pub fn release(&self) {
        self.release.add_permits(1);
    }

    async fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
    }
}

/// Prompt as seen by the model
#[derive(Debug, Clone)]
pub struct SeenPrompt {
    pub system: String,
    pub text: String,
    pub has_image: bool,
}

/// Model client replaying a script, then repeating a default reply
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<GeneratedCode, GenerationError>>>,
    prompts: Mutex<Vec<SeenPrompt>>,
    gate: Option<Arc<Gate>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Result<GeneratedCode, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    pub fn gated(gate: Arc<Gate>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            gate: Some(gate),
        })
    }

    pub fn prompts(&self) -> Vec<SeenPrompt> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

pub fn code(text: &str) -> Result<GeneratedCode, GenerationError> {
    Ok(GeneratedCode {
        code: text.to_string(),
        completion_id: None,
    })
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &UserPrompt,
    ) -> Result<GeneratedCode, GenerationError> {
        self.prompts.lock().push(SeenPrompt {
            system: system_prompt.to_string(),
            text: user_prompt.text.clone(),
            has_image: user_prompt.image.is_some(),
        });
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| code("df = pd.DataFrame({'item': ['bolt'], 'qty': [4]})"))
    }
}

/// Code runner replaying a script, then repeating a fallback result
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Result<RunOutput, ExecutionError>>>,
    fallback: Result<RunOutput, ExecutionError>,
    calls: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

impl ScriptedRunner {
    pub fn succeeding() -> Arc<Self> {
        Self::with(Vec::new(), Ok(table_output()), None)
    }

    pub fn always_failing(error: ExecutionError) -> Arc<Self> {
        Self::with(Vec::new(), Err(error), None)
    }

    pub fn scripted(
        script: Vec<Result<RunOutput, ExecutionError>>,
        fallback: Result<RunOutput, ExecutionError>,
    ) -> Arc<Self> {
        Self::with(script, fallback, None)
    }

    pub fn gated(gate: Arc<Gate>, fallback: Result<RunOutput, ExecutionError>) -> Arc<Self> {
        Self::with(Vec::new(), fallback, Some(gate))
    }

    fn with(
        script: Vec<Result<RunOutput, ExecutionError>>,
        fallback: Result<RunOutput, ExecutionError>,
        gate: Option<Arc<Gate>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            gate,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn table_output() -> RunOutput {
    RunOutput {
        artifact: super::sample_table(),
        stdout: String::new(),
    }
}

#[async_trait]
impl CodeRunner for ScriptedRunner {
    async fn run(&self, _code: &str) -> Result<RunOutput, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Writer that records destinations instead of producing files
pub struct RecordingWriter {
    written: Mutex<Vec<PathBuf>>,
    failure: Option<ExportError>,
}

impl RecordingWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            written: Mutex::new(Vec::new()),
            failure: None,
        })
    }

    pub fn failing(error: ExportError) -> Arc<Self> {
        Arc::new(Self {
            written: Mutex::new(Vec::new()),
            failure: Some(error),
        })
    }

    pub fn written(&self) -> Vec<PathBuf> {
        self.written.lock().clone()
    }
}

#[async_trait]
impl SpreadsheetWriter for RecordingWriter {
    async fn write(
        &self,
        _artifact: &TableArtifact,
        destination: &Path,
    ) -> Result<PathBuf, ExportError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.written.lock().push(destination.to_path_buf());
        Ok(destination.to_path_buf())
    }
}

/// Hook keeping every update it receives
#[derive(Default)]
pub struct RecordingHook {
    updates: Mutex<Vec<(String, String)>>,
}

impl RecordingHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.updates.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn owners(&self) -> Vec<String> {
        self.updates.lock().iter().map(|(o, _)| o.clone()).collect()
    }
}

impl UpdateHook for RecordingHook {
    fn notify(&self, owner: &str, message: &str) -> anyhow::Result<()> {
        self.updates
            .lock()
            .push((owner.to_string(), message.to_string()));
        Ok(())
    }
}

pub fn collaborators(
    model: Arc<ScriptedModel>,
    runner: Arc<ScriptedRunner>,
    writer: Arc<RecordingWriter>,
) -> Collaborators {
    Collaborators {
        model,
        runner,
        writer,
    }
}
