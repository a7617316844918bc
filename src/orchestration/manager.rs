//! # Task Manager
//!
//! Synchronous control surface over the task engine. Every call is handed to
//! the worker pool, which forwards it to the scheduler thread and blocks until
//! the scheduler answers.
//!
//! ```rust,no_run
//! use image2sheet_core::config::ConfigManager;
//! use image2sheet_core::events::TracingHook;
//! use image2sheet_core::orchestration::TaskManager;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! let manager = TaskManager::from_config(config.config())?;
//!
//! let task_id = manager.create_task("alice", "uploads/scan.png", "scan.png", Arc::new(TracingHook))?;
//! manager.start_task("alice", &task_id)?;
//! if let Some(report) = manager.get_status("alice", &task_id)? {
//!     println!("{} {:?}", report.status, report.last_error);
//! }
//! manager.shutdown()?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::bridge::SchedulerThread;
use super::iteration_executor::Collaborators;
use super::pool::WorkerPool;
use super::scheduler::{CommandResponder, SchedulerCommand, TaskScheduler};
use super::task::{TaskRequest, TaskSettings};
use crate::client::OpenAiCompatibleClient;
use crate::config::ConverterConfig;
use crate::error::Result;
use crate::events::{LifecycleEvent, LifecyclePublisher, UpdateHook};
use crate::execution::ProcessCodeRunner;
use crate::export::XlsxSheetWriter;
use crate::models::{TaskStatusReport, TaskSummary};
use crate::registry::RegistryStats;

/// Synchronous facade owning the scheduler thread and the worker pool
pub struct TaskManager {
    scheduler: SchedulerThread,
    pool: WorkerPool,
    publisher: LifecyclePublisher,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("workers", &self.pool.size())
            .field("shut_down", &self.shut_down.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl TaskManager {
    /// Build a manager backed by the HTTP model client, the process runner and
    /// the xlsx writer
    pub fn from_config(config: &ConverterConfig) -> Result<Self> {
        let collaborators = Collaborators {
            model: Arc::new(OpenAiCompatibleClient::new(config.model.clone())?),
            runner: Arc::new(ProcessCodeRunner::new(config.runner.clone())),
            writer: Arc::new(XlsxSheetWriter::new()),
        };
        Self::new(config, collaborators)
    }

    pub fn new(config: &ConverterConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let publisher = LifecyclePublisher::default();
        let (scheduler, sender) = TaskScheduler::new(
            TaskSettings::from(config),
            collaborators,
            publisher.clone(),
            config.bridge.shutdown_timeout(),
            config.bridge.command_buffer_size,
        );
        let scheduler = SchedulerThread::spawn(scheduler, sender)?;
        let pool = WorkerPool::new(config.bridge.worker_pool_size)?;

        info!(
            workers = pool.size(),
            max_iterations = config.engine.max_iterations,
            "🚀 MANAGER: Task manager ready"
        );
        Ok(Self {
            scheduler,
            pool,
            publisher,
            shut_down: AtomicBool::new(false),
        })
    }

    fn submit<T, F>(&self, build: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(CommandResponder<T>) -> SchedulerCommand + Send + 'static,
    {
        let client = self.scheduler.client();
        self.pool.execute(move || client.request(build))?
    }

    /// Register a task and begin initializing it. Returns the new task id.
    pub fn create_task(
        &self,
        owner: &str,
        image_path: impl Into<PathBuf>,
        file_name: &str,
        hook: Arc<dyn UpdateHook>,
    ) -> Result<String> {
        let request = TaskRequest {
            owner: owner.to_string(),
            image_path: image_path.into(),
            file_name: file_name.to_string(),
            hook,
        };
        self.submit(move |resp| SchedulerCommand::CreateTask { request, resp })
    }

    /// Start the run loop. False for unknown, running or terminal tasks.
    pub fn start_task(&self, owner: &str, task_id: &str) -> Result<bool> {
        let (owner, task_id) = (owner.to_string(), task_id.to_string());
        self.submit(move |resp| SchedulerCommand::StartTask {
            owner,
            task_id,
            resp,
        })
    }

    pub fn get_status(&self, owner: &str, task_id: &str) -> Result<Option<TaskStatusReport>> {
        let (owner, task_id) = (owner.to_string(), task_id.to_string());
        self.submit(move |resp| SchedulerCommand::GetStatus {
            owner,
            task_id,
            resp,
        })
    }

    /// Signal cancellation. The task reaches CANCELLED at its next checkpoint.
    pub fn cancel_task(&self, owner: &str, task_id: &str) -> Result<bool> {
        let (owner, task_id) = (owner.to_string(), task_id.to_string());
        self.submit(move |resp| SchedulerCommand::CancelTask {
            owner,
            task_id,
            resp,
        })
    }

    /// Attach feedback to the task's current iteration
    pub fn provide_feedback(&self, owner: &str, task_id: &str, feedback: &str) -> Result<bool> {
        let (owner, task_id, feedback) =
            (owner.to_string(), task_id.to_string(), feedback.to_string());
        self.submit(move |resp| SchedulerCommand::ProvideFeedback {
            owner,
            task_id,
            feedback,
            resp,
        })
    }

    /// Cancel the task if it is still active, then remove it
    pub fn delete_task(&self, owner: &str, task_id: &str) -> Result<bool> {
        let (owner, task_id) = (owner.to_string(), task_id.to_string());
        self.submit(move |resp| SchedulerCommand::DeleteTask {
            owner,
            task_id,
            resp,
        })
    }

    /// Ask a running task to pause at its next iteration boundary
    pub fn pause_task(&self, owner: &str, task_id: &str) -> Result<bool> {
        let (owner, task_id) = (owner.to_string(), task_id.to_string());
        self.submit(move |resp| SchedulerCommand::PauseTask {
            owner,
            task_id,
            resp,
        })
    }

    pub fn resume_task(&self, owner: &str, task_id: &str) -> Result<bool> {
        let (owner, task_id) = (owner.to_string(), task_id.to_string());
        self.submit(move |resp| SchedulerCommand::ResumeTask {
            owner,
            task_id,
            resp,
        })
    }

    pub fn list_tasks(&self, owner: &str) -> Result<Vec<TaskSummary>> {
        let owner = owner.to_string();
        self.submit(move |resp| SchedulerCommand::ListTasks { owner, resp })
    }

    pub fn stats(&self) -> Result<RegistryStats> {
        self.submit(|resp| SchedulerCommand::GetStats { resp })
    }

    /// Receive every task status change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.publisher.subscribe()
    }

    /// Cancel all tasks, stop the scheduler thread and join the worker pool.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let drained = self.submit(|resp| SchedulerCommand::Shutdown { resp });
        if let Err(e) = &drained {
            warn!(error = %e, "🚀 MANAGER: Scheduler did not acknowledge shutdown");
        }
        self.scheduler.join()?;
        self.pool.shutdown();
        info!("🚀 MANAGER: Task manager stopped");
        drained
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "🚀 MANAGER: Shutdown on drop failed");
        }
    }
}
