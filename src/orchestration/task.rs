//! # Task
//!
//! One image-to-spreadsheet conversion job. The task owns its state machine,
//! metadata and iteration executor, and drives the self-correction loop.
//!
//! Status is only written from the task's own execution path. Cancellation and
//! pause requests are signals that the loop observes at its checkpoints: the top
//! of every iteration and right after every collaborator call returns.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::iteration_executor::{
    Collaborators, ExecutionOutcome, ExportOutcome, GenerationOutcome, IterationExecutor,
};
use crate::config::ConverterConfig;
use crate::constants::{self, events};
use crate::error::{ConverterError, Result};
use crate::events::{notify_safely, LifecyclePublisher, UpdateHook};
use crate::logging::log_task_operation;
use crate::models::{IterationRecord, TaskStatusReport};
use crate::prompts::{self, EncodedImage};
use crate::state_machine::{TaskEvent, TaskStateMachine, TaskStatus, TaskTransition};

/// Engine settings every task is created with
#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub max_iterations: u32,
    pub iteration_pause: Duration,
    pub output_dir: PathBuf,
    pub output_binding: String,
    /// alias -> module, as presented to the model
    pub libraries: Vec<(String, String)>,
}

impl From<&ConverterConfig> for TaskSettings {
    fn from(config: &ConverterConfig) -> Self {
        Self {
            max_iterations: config.engine.max_iterations,
            iteration_pause: config.engine.iteration_pause(),
            output_dir: config.engine.output_dir.clone(),
            output_binding: config.runner.output_binding.clone(),
            libraries: config
                .runner
                .allowed_bindings
                .iter()
                .map(|(alias, module)| (alias.clone(), module.clone()))
                .collect(),
        }
    }
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self::from(&ConverterConfig::default())
    }
}

/// What a caller supplies to create a task
#[derive(Clone)]
pub struct TaskRequest {
    pub owner: String,
    pub image_path: PathBuf,
    pub file_name: String,
    pub hook: Arc<dyn UpdateHook>,
}

impl std::fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRequest")
            .field("owner", &self.owner)
            .field("image_path", &self.image_path)
            .field("file_name", &self.file_name)
            .finish_non_exhaustive()
    }
}

/// Cancellation and pause flags plus a wake-up for the inter-iteration pause
#[derive(Debug, Default)]
struct TaskSignals {
    cancelled: AtomicBool,
    pause_requested: AtomicBool,
    wake: Notify,
}

impl TaskSignals {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless a signal arrives first
    async fn pause_between_iterations(&self, duration: Duration) {
        if duration.is_zero() || self.is_cancelled() || self.pause_requested.load(Ordering::Acquire)
        {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wake.notified() => {}
        }
    }
}

#[derive(Debug)]
struct TaskState {
    machine: TaskStateMachine,
    last_error: Option<String>,
    last_message: Option<String>,
    output_file: Option<PathBuf>,
}

/// Releases the run claim however the loop exits, including abort
struct RunClaim<'a>(&'a AtomicBool);

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A conversion task
pub struct Task {
    id: String,
    owner: String,
    file_name: String,
    image_path: PathBuf,
    settings: TaskSettings,
    state: Mutex<TaskState>,
    signals: TaskSignals,
    run_claimed: AtomicBool,
    /// Serializes activities (initialize, run, settle) in submission order
    activity: tokio::sync::Mutex<()>,
    executor: IterationExecutor,
    hook: Arc<dyn UpdateHook>,
    publisher: LifecyclePublisher,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        request: TaskRequest,
        settings: TaskSettings,
        collaborators: Collaborators,
        publisher: LifecyclePublisher,
    ) -> Self {
        let id = id.into();
        let executor =
            IterationExecutor::new(id.clone(), settings.output_binding.clone(), collaborators);
        Self {
            executor,
            owner: request.owner,
            file_name: request.file_name,
            image_path: request.image_path,
            hook: request.hook,
            settings,
            state: Mutex::new(TaskState {
                machine: TaskStateMachine::new(),
                last_error: None,
                last_message: None,
                output_file: None,
            }),
            signals: TaskSignals::default(),
            run_claimed: AtomicBool::new(false),
            activity: tokio::sync::Mutex::new(()),
            publisher,
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().machine.current_state()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.signals.is_cancelled()
    }

    pub fn transitions(&self) -> Vec<TaskTransition> {
        self.state.lock().machine.transitions().to_vec()
    }

    pub fn history(&self) -> Vec<IterationRecord> {
        self.executor.history()
    }

    pub fn report(&self) -> TaskStatusReport {
        let state = self.state.lock();
        TaskStatusReport {
            task_id: self.id.clone(),
            owner: self.owner.clone(),
            file_name: self.file_name.clone(),
            status: state.machine.current_state(),
            metadata: state.machine.metadata().clone(),
            max_iterations: self.settings.max_iterations,
            last_error: state.last_error.clone(),
            last_message: state.last_message.clone(),
            output_file: state.output_file.clone(),
        }
    }

    /// Request cancellation. The loop observes it at its next checkpoint.
    pub fn cancel(&self) {
        self.signals.cancelled.store(true, Ordering::Release);
        self.signals.wake.notify_one();
    }

    /// Ask a running loop to stop at the next iteration boundary
    pub fn request_pause(&self) {
        self.signals.pause_requested.store(true, Ordering::Release);
        self.signals.wake.notify_one();
    }

    /// Drop a pause request the loop has not observed yet
    pub fn withdraw_pause(&self) -> bool {
        self.signals.pause_requested.swap(false, Ordering::AcqRel)
    }

    /// Reserve the run loop. Fails if a run is already scheduled or running.
    pub fn try_claim_run(&self) -> bool {
        self.run_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_run_claimed(&self) -> bool {
        self.run_claimed.load(Ordering::Acquire)
    }

    /// Attach feedback to the current iteration
    pub fn provide_feedback(&self, feedback: &str) -> bool {
        let iteration = self.state.lock().machine.metadata().current_iteration;
        if iteration == 0 {
            return false;
        }
        self.executor.record_feedback(iteration, feedback)
    }

    /// Wait for the previous activity on this task to finish
    pub async fn begin_activity(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.activity.lock().await
    }

    /// Prepare prompts and load the image.
    ///
    /// CREATED → INITIALIZING → CREATED on success, FAILED on error.
    pub async fn initialize(&self) -> Result<()> {
        if !self.apply(TaskEvent::Initialize, "Preparing task") {
            return Err(ConverterError::Initialization(format!(
                "task {} cannot be initialized from {}",
                self.id,
                self.status()
            )));
        }

        let loaded = load_image(&self.image_path).await;

        if self.signals.is_cancelled() {
            self.settle_cancellation();
            return Ok(());
        }

        match loaded {
            Ok(image) => {
                let libraries: Vec<(&str, &str)> = self
                    .settings
                    .libraries
                    .iter()
                    .map(|(alias, module)| (alias.as_str(), module.as_str()))
                    .collect();
                self.executor.prepare(
                    prompts::system_prompt(&self.settings.output_binding, &libraries),
                    Some(image),
                );
                self.apply(TaskEvent::Initialized, "Task ready");
                Ok(())
            }
            Err(err) => {
                let message = format!("Initialization failed: {err}");
                self.state.lock().last_error = Some(message.clone());
                self.apply(TaskEvent::fail_with_error(message), "Task failed to initialize");
                Err(err)
            }
        }
    }

    /// Drive the self-correction loop until the task completes, fails, is
    /// cancelled or pauses.
    ///
    /// The caller must hold a run claim from [`Task::try_claim_run`].
    pub async fn run(&self) {
        let _claim = RunClaim(&self.run_claimed);

        if self.signals.is_cancelled() {
            self.settle_cancellation();
            return;
        }

        let resuming = self.status() == TaskStatus::Paused;
        if !self.apply(
            TaskEvent::Start,
            if resuming { "Task resumed" } else { "Task started" },
        ) {
            return;
        }

        loop {
            if self.signals.is_cancelled() {
                self.settle_cancellation();
                return;
            }
            let attempted = self.state.lock().machine.metadata().total_iterations;
            if attempted >= self.settings.max_iterations {
                break;
            }
            if self.signals.pause_requested.swap(false, Ordering::AcqRel) {
                self.apply(TaskEvent::Pause, "Task paused");
                return;
            }

            let iteration = {
                let mut state = self.state.lock();
                let metadata = state.machine.metadata_mut();
                metadata.total_iterations += 1;
                metadata.total_iterations
            };

            if self.run_iteration(iteration).await {
                return;
            }

            if iteration < self.settings.max_iterations {
                self.signals
                    .pause_between_iterations(self.settings.iteration_pause)
                    .await;
            }
        }

        let message = {
            let mut state = self.state.lock();
            let message = match state.last_error.as_deref() {
                Some(last) => format!(
                    "Iteration budget of {} exhausted; last error: {last}",
                    self.settings.max_iterations
                ),
                None => format!(
                    "Iteration budget of {} exhausted",
                    self.settings.max_iterations
                ),
            };
            state.last_error = Some(message.clone());
            message
        };
        self.apply(TaskEvent::fail_with_error(message), "Task failed");
    }

    /// One generate/execute/export cycle. Returns true when the task stopped.
    async fn run_iteration(&self, iteration: u32) -> bool {
        let prompt = self.executor.prompt_for(iteration);

        let generated = self.executor.generate_code(iteration, &prompt).await;
        self.record_message(generated.message());
        if self.observe_cancellation() {
            return true;
        }
        if let GenerationOutcome::Failed(err) = generated {
            self.record_failure(err.to_string());
            return false;
        }
        self.state.lock().machine.metadata_mut().current_iteration = iteration;

        let executed = self.executor.execute_code(iteration).await;
        self.record_message(executed.message());
        if self.observe_cancellation() {
            return true;
        }
        match executed {
            ExecutionOutcome::Success { .. } => {}
            ExecutionOutcome::Ambiguous(err) | ExecutionOutcome::Failed(err) => {
                self.record_failure(err.to_string());
                return false;
            }
        }

        let destination = self
            .settings
            .output_dir
            .join(constants::export_file_name(&self.id, iteration));
        let exported = self.executor.export_artifact(iteration, &destination).await;
        self.record_message(exported.message());
        if self.observe_cancellation() {
            return true;
        }
        match exported {
            ExportOutcome::Success(path) => {
                self.state.lock().output_file = Some(path);
                self.apply(TaskEvent::Complete, "Spreadsheet ready");
            }
            ExportOutcome::Failed(err) => {
                let message = format!("Export failed: {err}");
                self.state.lock().last_error = Some(message.clone());
                self.apply(TaskEvent::fail_with_error(message), "Task failed");
            }
        }
        true
    }

    fn record_message(&self, message: String) {
        self.state.lock().last_message = Some(message);
    }

    fn record_failure(&self, message: String) {
        let mut state = self.state.lock();
        state.machine.metadata_mut().error_count += 1;
        state.last_error = Some(message);
    }

    fn observe_cancellation(&self) -> bool {
        if self.signals.is_cancelled() {
            self.settle_cancellation();
            true
        } else {
            false
        }
    }

    /// Move a non-terminal task to CANCELLED. Returns false if already terminal.
    ///
    /// Only called from the task's own activity, or by the scheduler once no
    /// activity can still write to the task.
    pub fn settle_cancellation(&self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.apply(TaskEvent::Cancel, "Task cancelled")
    }

    /// Apply a transition, then log, publish and notify. Returns false if the
    /// transition was rejected.
    fn apply(&self, event: TaskEvent, message: &str) -> bool {
        let outcome = {
            let mut state = self.state.lock();
            let from = state.machine.current_state();
            state.machine.transition(&event).map(|to| (from, to))
        };

        match outcome {
            Ok((from, to)) => {
                debug!(task_id = %self.id, from = %from, to = %to, "🔄 TRANSITION");
                log_task_operation(
                    event.event_type(),
                    &self.id,
                    &self.owner,
                    &to.to_string(),
                    event.error_message(),
                );
                let update = match event.error_message() {
                    Some(detail) => format!("Task {} {to}: {message} ({detail})", self.id),
                    None => format!("Task {} {to}: {message}", self.id),
                };
                self.publisher
                    .publish(lifecycle_event_name(&event), &self.id, &self.owner, to, &update);
                notify_safely(self.hook.as_ref(), &self.owner, &update);
                true
            }
            Err(err) => {
                warn!(task_id = %self.id, error = %err, "Transition rejected");
                false
            }
        }
    }
}

fn lifecycle_event_name(event: &TaskEvent) -> &'static str {
    match event {
        TaskEvent::Initialize => events::TASK_INITIALIZING,
        TaskEvent::Initialized => events::TASK_INITIALIZED,
        TaskEvent::Start => events::TASK_STARTED,
        TaskEvent::Pause => events::TASK_PAUSED,
        TaskEvent::Complete => events::TASK_COMPLETED,
        TaskEvent::Fail(_) => events::TASK_FAILED,
        TaskEvent::Cancel => events::TASK_CANCELLED,
    }
}

fn mime_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/png",
    }
}

async fn load_image(path: &Path) -> Result<EncodedImage> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        ConverterError::Initialization(format!("cannot read image {}: {e}", path.display()))
    })?;
    if bytes.is_empty() {
        return Err(ConverterError::Initialization(format!(
            "image {} is empty",
            path.display()
        )));
    }
    info!(path = %path.display(), bytes = bytes.len(), "🖼️ IMAGE: Loaded");
    Ok(EncodedImage {
        mime_type: mime_type_for(path).to_string(),
        data: STANDARD.encode(bytes),
    })
}
