//! # Task Registry
//!
//! Owner → task id → entry. The registry is owned by the scheduler and only
//! mutated from its command loop, so structural changes never race.
//!
//! Each entry also tracks the background activities spawned for its task so the
//! scheduler can tell an idle task from a busy one, and abort everything when
//! the task is deleted.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::models::TaskSummary;
use crate::orchestration::task::Task;

/// A task plus the handles of activities spawned for it
#[derive(Debug)]
pub struct TaskEntry {
    pub task: Arc<Task>,
    activities: Vec<JoinHandle<()>>,
}

impl TaskEntry {
    pub fn new(task: Arc<Task>) -> Self {
        Self {
            task,
            activities: Vec::new(),
        }
    }

    /// Track a spawned activity, dropping handles that already finished
    pub fn track(&mut self, handle: JoinHandle<()>) {
        self.activities.retain(|h| !h.is_finished());
        self.activities.push(handle);
    }

    /// True when no spawned activity is still pending
    pub fn is_idle(&self) -> bool {
        self.activities.iter().all(JoinHandle::is_finished)
    }

    pub fn take_activities(&mut self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut self.activities)
    }
}

/// Counts reported by the scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub owners: usize,
    pub tasks: usize,
    pub active_tasks: usize,
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, HashMap<String, TaskEntry>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task. Returns false if the owner already has a task with that id.
    pub fn insert(&mut self, task: Arc<Task>) -> bool {
        let owned = self.tasks.entry(task.owner().to_string()).or_default();
        if owned.contains_key(task.id()) {
            return false;
        }
        owned.insert(task.id().to_string(), TaskEntry::new(task));
        true
    }

    pub fn contains(&self, owner: &str, task_id: &str) -> bool {
        self.get(owner, task_id).is_some()
    }

    pub fn get(&self, owner: &str, task_id: &str) -> Option<&TaskEntry> {
        self.tasks.get(owner)?.get(task_id)
    }

    pub fn get_mut(&mut self, owner: &str, task_id: &str) -> Option<&mut TaskEntry> {
        self.tasks.get_mut(owner)?.get_mut(task_id)
    }

    /// Remove a task, dropping the owner's map once it is empty
    pub fn remove(&mut self, owner: &str, task_id: &str) -> Option<TaskEntry> {
        let owned = self.tasks.get_mut(owner)?;
        let entry = owned.remove(task_id);
        if owned.is_empty() {
            self.tasks.remove(owner);
        }
        entry
    }

    /// Summaries of one owner's tasks, oldest first
    pub fn summaries(&self, owner: &str) -> Vec<TaskSummary> {
        let mut summaries: Vec<TaskSummary> = self
            .tasks
            .get(owner)
            .map(|owned| {
                owned
                    .values()
                    .map(|entry| TaskSummary::from(&entry.task.report()))
                    .collect()
            })
            .unwrap_or_default();
        summaries.sort_by(|a, b| {
            a.metadata
                .created_at
                .cmp(&b.metadata.created_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        summaries
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut TaskEntry> {
        self.tasks.values_mut().flat_map(HashMap::values_mut)
    }

    pub fn len(&self) -> usize {
        self.tasks.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let entries = || self.tasks.values().flat_map(HashMap::values);
        RegistryStats {
            owners: self.tasks.len(),
            tasks: self.len(),
            active_tasks: entries().filter(|e| !e.task.is_terminal()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LifecyclePublisher, TracingHook};
    use crate::orchestration::iteration_executor::Collaborators;
    use crate::orchestration::task::{TaskRequest, TaskSettings};
    use crate::state_machine::TaskStatus;

    mod inert {
        use crate::client::{GeneratedCode, ModelClient};
        use crate::error::{ExecutionError, ExportError, GenerationError};
        use crate::execution::{CodeRunner, RunOutput};
        use crate::export::SpreadsheetWriter;
        use crate::models::TableArtifact;
        use crate::prompts::UserPrompt;
        use async_trait::async_trait;
        use std::path::{Path, PathBuf};

        pub struct Inert;

        #[async_trait]
        impl ModelClient for Inert {
            async fn generate(
                &self,
                _system_prompt: &str,
                _user_prompt: &UserPrompt,
            ) -> Result<GeneratedCode, GenerationError> {
                Err(GenerationError::EmptyCode)
            }
        }

        #[async_trait]
        impl CodeRunner for Inert {
            async fn run(&self, _code: &str) -> Result<RunOutput, ExecutionError> {
                Err(ExecutionError::Spawn("inert".into()))
            }
        }

        #[async_trait]
        impl SpreadsheetWriter for Inert {
            async fn write(
                &self,
                _artifact: &TableArtifact,
                _destination: &Path,
            ) -> Result<PathBuf, ExportError> {
                Err(ExportError::Writer("inert".into()))
            }
        }
    }

    fn task(owner: &str, id: &str) -> Arc<Task> {
        Arc::new(Task::new(
            id,
            TaskRequest {
                owner: owner.into(),
                image_path: "scan.png".into(),
                file_name: "scan.png".into(),
                hook: Arc::new(TracingHook),
            },
            TaskSettings::default(),
            Collaborators {
                model: Arc::new(inert::Inert),
                runner: Arc::new(inert::Inert),
                writer: Arc::new(inert::Inert),
            },
            LifecyclePublisher::default(),
        ))
    }

    #[test]
    fn ids_are_unique_per_owner() {
        let mut registry = TaskRegistry::new();
        assert!(registry.insert(task("alice", "task_00000001")));
        assert!(!registry.insert(task("alice", "task_00000001")));
        assert!(registry.insert(task("bob", "task_00000001")));
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.stats(),
            RegistryStats {
                owners: 2,
                tasks: 2,
                active_tasks: 2
            }
        );
    }

    #[test]
    fn owners_only_see_their_own_tasks() {
        let mut registry = TaskRegistry::new();
        registry.insert(task("alice", "task_00000001"));
        registry.insert(task("alice", "task_00000002"));
        registry.insert(task("bob", "task_00000003"));

        let listed: Vec<_> = registry
            .summaries("alice")
            .into_iter()
            .map(|s| s.task_id)
            .collect();
        assert_eq!(listed.len(), 2);
        assert!(!listed.contains(&"task_00000003".to_string()));
        assert!(registry.get("bob", "task_00000001").is_none());
        assert_eq!(
            registry.get("alice", "task_00000001").unwrap().task.status(),
            TaskStatus::Created
        );
    }

    #[test]
    fn removing_the_last_task_drops_the_owner() {
        let mut registry = TaskRegistry::new();
        registry.insert(task("alice", "task_00000001"));

        assert!(registry.remove("alice", "task_00000001").is_some());
        assert!(registry.remove("alice", "task_00000001").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn entries_without_activities_are_idle() {
        let entry = TaskEntry::new(task("alice", "task_00000001"));
        assert!(entry.is_idle());
    }
}
