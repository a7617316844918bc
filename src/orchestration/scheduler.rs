//! # Task Scheduler
//!
//! Single-consumer command loop that owns the [`TaskRegistry`]. Every facade
//! operation arrives here as a [`SchedulerCommand`] carrying a oneshot
//! responder, so registry mutation is serialized without a lock.
//!
//! Task activities (initialize, run, cancellation settling) are spawned onto
//! the scheduler's own runtime. A task's activities take turns through its
//! activity lock, so no two steps of the same task ever run concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::iteration_executor::Collaborators;
use super::task::{Task, TaskRequest, TaskSettings};
use crate::constants::{self, events};
use crate::error::{ConverterError, Result};
use crate::events::LifecyclePublisher;
use crate::logging::log_task_operation;
use crate::models::{TaskStatusReport, TaskSummary};
use crate::registry::{RegistryStats, TaskEntry, TaskRegistry};
use crate::state_machine::TaskStatus;

/// Scheduler command responder type
pub type CommandResponder<T> = oneshot::Sender<Result<T>>;

const MAX_ID_ATTEMPTS: usize = 8;

/// Commands accepted by the [`TaskScheduler`]
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Register a task and start initializing it
    CreateTask {
        request: TaskRequest,
        resp: CommandResponder<String>,
    },
    /// Enter the run loop of a CREATED or PAUSED task
    StartTask {
        owner: String,
        task_id: String,
        resp: CommandResponder<bool>,
    },
    GetStatus {
        owner: String,
        task_id: String,
        resp: CommandResponder<Option<TaskStatusReport>>,
    },
    CancelTask {
        owner: String,
        task_id: String,
        resp: CommandResponder<bool>,
    },
    ProvideFeedback {
        owner: String,
        task_id: String,
        feedback: String,
        resp: CommandResponder<bool>,
    },
    /// Cancel if active, stop every activity, then forget the task
    DeleteTask {
        owner: String,
        task_id: String,
        resp: CommandResponder<bool>,
    },
    PauseTask {
        owner: String,
        task_id: String,
        resp: CommandResponder<bool>,
    },
    ResumeTask {
        owner: String,
        task_id: String,
        resp: CommandResponder<bool>,
    },
    ListTasks {
        owner: String,
        resp: CommandResponder<Vec<TaskSummary>>,
    },
    GetStats {
        resp: CommandResponder<RegistryStats>,
    },
    /// Cancel everything, wait for activities to wind down and stop the loop
    Shutdown { resp: CommandResponder<()> },
}

/// Owner of the registry and of every task's execution
pub struct TaskScheduler {
    registry: TaskRegistry,
    settings: TaskSettings,
    collaborators: Collaborators,
    publisher: LifecyclePublisher,
    shutdown_timeout: Duration,
    command_receiver: Option<mpsc::Receiver<SchedulerCommand>>,
}

impl TaskScheduler {
    pub fn new(
        settings: TaskSettings,
        collaborators: Collaborators,
        publisher: LifecyclePublisher,
        shutdown_timeout: Duration,
        command_buffer_size: usize,
    ) -> (Self, mpsc::Sender<SchedulerCommand>) {
        let (command_sender, command_receiver) = mpsc::channel(command_buffer_size.max(1));

        let scheduler = Self {
            registry: TaskRegistry::new(),
            settings,
            collaborators,
            publisher,
            shutdown_timeout,
            command_receiver: Some(command_receiver),
        };

        (scheduler, command_sender)
    }

    /// Process commands until shutdown or until every sender is gone
    pub async fn start(&mut self) -> Result<()> {
        let mut command_receiver = self.command_receiver.take().ok_or_else(|| {
            ConverterError::Initialization("Command receiver already taken".to_string())
        })?;

        info!("🗓️ SCHEDULER: Command loop started");

        while let Some(command) = command_receiver.recv().await {
            debug!(command = ?command, "🗓️ SCHEDULER: Processing command");
            if !self.handle_command(command).await {
                info!("🗓️ SCHEDULER: Shutdown complete");
                return Ok(());
            }
        }

        info!("🗓️ SCHEDULER: Command channel closed, draining tasks");
        self.drain().await;
        Ok(())
    }

    async fn handle_command(&mut self, command: SchedulerCommand) -> bool {
        match command {
            SchedulerCommand::CreateTask { request, resp } => {
                let _ = resp.send(self.handle_create(request));
                true
            }
            SchedulerCommand::StartTask {
                owner,
                task_id,
                resp,
            } => {
                let _ = resp.send(Ok(self.handle_start(&owner, &task_id)));
                true
            }
            SchedulerCommand::GetStatus {
                owner,
                task_id,
                resp,
            } => {
                let report = self
                    .registry
                    .get(&owner, &task_id)
                    .map(|entry| entry.task.report());
                let _ = resp.send(Ok(report));
                true
            }
            SchedulerCommand::CancelTask {
                owner,
                task_id,
                resp,
            } => {
                let _ = resp.send(Ok(self.handle_cancel(&owner, &task_id)));
                true
            }
            SchedulerCommand::ProvideFeedback {
                owner,
                task_id,
                feedback,
                resp,
            } => {
                let _ = resp.send(Ok(self.handle_feedback(&owner, &task_id, &feedback)));
                true
            }
            SchedulerCommand::DeleteTask {
                owner,
                task_id,
                resp,
            } => {
                let deleted = self.handle_delete(&owner, &task_id).await;
                let _ = resp.send(Ok(deleted));
                true
            }
            SchedulerCommand::PauseTask {
                owner,
                task_id,
                resp,
            } => {
                let _ = resp.send(Ok(self.handle_pause(&owner, &task_id)));
                true
            }
            SchedulerCommand::ResumeTask {
                owner,
                task_id,
                resp,
            } => {
                let _ = resp.send(Ok(self.handle_resume(&owner, &task_id)));
                true
            }
            SchedulerCommand::ListTasks { owner, resp } => {
                let _ = resp.send(Ok(self.registry.summaries(&owner)));
                true
            }
            SchedulerCommand::GetStats { resp } => {
                let _ = resp.send(Ok(self.registry.stats()));
                true
            }
            SchedulerCommand::Shutdown { resp } => {
                info!(tasks = self.registry.len(), "🗓️ SCHEDULER: Shutting down");
                self.drain().await;
                let _ = resp.send(Ok(()));
                false
            }
        }
    }

    fn handle_create(&mut self, request: TaskRequest) -> Result<String> {
        let owner = request.owner.clone();
        let task_id = (0..MAX_ID_ATTEMPTS)
            .map(|_| constants::new_task_id())
            .find(|id| !self.registry.contains(&owner, id))
            .ok_or_else(|| {
                ConverterError::Initialization(format!("no free task id for owner {owner}"))
            })?;

        let task = Arc::new(Task::new(
            task_id.clone(),
            request,
            self.settings.clone(),
            self.collaborators.clone(),
            self.publisher.clone(),
        ));
        if !self.registry.insert(Arc::clone(&task)) {
            return Err(ConverterError::Initialization(format!(
                "task {task_id} already registered"
            )));
        }

        log_task_operation("create", &task_id, &owner, "CREATED", None);
        self.publisher.publish(
            events::TASK_CREATED,
            &task_id,
            &owner,
            TaskStatus::Created,
            format!("Task {task_id} created"),
        );

        if let Some(entry) = self.registry.get_mut(&owner, &task_id) {
            spawn_activity(entry, |task| async move {
                if let Err(err) = task.initialize().await {
                    warn!(task_id = %task.id(), error = %err, "Task initialization failed");
                }
            });
        }
        Ok(task_id)
    }

    fn handle_start(&mut self, owner: &str, task_id: &str) -> bool {
        let Some(entry) = self.registry.get_mut(owner, task_id) else {
            return false;
        };
        let status = entry.task.status();
        let startable = matches!(
            status,
            TaskStatus::Created | TaskStatus::Initializing | TaskStatus::Paused
        );
        if !startable || entry.task.is_cancel_requested() || !entry.task.try_claim_run() {
            debug!(task_id = %task_id, status = %status, "Start rejected");
            return false;
        }

        spawn_activity(entry, |task| async move { task.run().await });
        true
    }

    fn handle_cancel(&mut self, owner: &str, task_id: &str) -> bool {
        let Some(entry) = self.registry.get_mut(owner, task_id) else {
            return false;
        };
        if entry.task.is_terminal() {
            return false;
        }

        entry.task.cancel();
        if entry.is_idle() {
            entry.task.settle_cancellation();
        } else {
            // A pending activity observes the signal; settle after it in case it does not
            spawn_activity(entry, |task| async move {
                task.settle_cancellation();
            });
        }
        true
    }

    fn handle_feedback(&self, owner: &str, task_id: &str, feedback: &str) -> bool {
        match self.registry.get(owner, task_id) {
            Some(entry) if !entry.task.is_terminal() => entry.task.provide_feedback(feedback),
            _ => false,
        }
    }

    fn handle_pause(&mut self, owner: &str, task_id: &str) -> bool {
        let Some(entry) = self.registry.get(owner, task_id) else {
            return false;
        };
        let task = &entry.task;
        if task.is_terminal() || task.status() == TaskStatus::Paused || !task.is_run_claimed() {
            return false;
        }
        task.request_pause();
        true
    }

    fn handle_resume(&mut self, owner: &str, task_id: &str) -> bool {
        let Some(entry) = self.registry.get_mut(owner, task_id) else {
            return false;
        };
        if entry.task.is_terminal() {
            return false;
        }
        if entry.task.status() != TaskStatus::Paused {
            // A pause that has not been observed yet can simply be withdrawn
            return entry.task.withdraw_pause();
        }
        if entry.task.is_cancel_requested() || !entry.task.try_claim_run() {
            return false;
        }
        spawn_activity(entry, |task| async move { task.run().await });
        true
    }

    async fn handle_delete(&mut self, owner: &str, task_id: &str) -> bool {
        let Some(mut entry) = self.registry.remove(owner, task_id) else {
            return false;
        };

        if !entry.task.is_terminal() {
            entry.task.cancel();
        }
        for handle in entry.take_activities() {
            handle.abort();
            let _ = handle.await;
        }
        entry.task.settle_cancellation();

        log_task_operation("delete", task_id, owner, &entry.task.status().to_string(), None);
        self.publisher.publish(
            events::TASK_DELETED,
            task_id,
            owner,
            entry.task.status(),
            format!("Task {task_id} deleted"),
        );
        true
    }

    /// Cancel every task and wait up to the shutdown timeout for activities
    async fn drain(&mut self) {
        let mut handles = Vec::new();
        for entry in self.registry.entries_mut() {
            if !entry.task.is_terminal() {
                entry.task.cancel();
            }
            handles.extend(entry.take_activities());
        }

        let deadline = Instant::now() + self.shutdown_timeout;
        let mut aborted = 0usize;
        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                let _ = handle.await;
                aborted += 1;
            }
        }
        if aborted > 0 {
            warn!(aborted, "🗓️ SCHEDULER: Activities aborted after shutdown timeout");
        }

        for entry in self.registry.entries_mut() {
            entry.task.settle_cancellation();
        }
    }
}

/// Spawn `activity` for the entry's task, behind whatever is already queued
fn spawn_activity<F, Fut>(entry: &mut TaskEntry, activity: F)
where
    F: FnOnce(Arc<Task>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = Arc::clone(&entry.task);
    let work = activity(Arc::clone(&task));
    entry.track(tokio::spawn(async move {
        let _turn = task.begin_activity().await;
        work.await;
    }));
}
