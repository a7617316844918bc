use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::TaskEvent,
    states::TaskStatus,
};
use crate::models::TaskMetadata;

/// One applied transition, kept in order of application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTransition {
    pub from_state: TaskStatus,
    pub to_state: TaskStatus,
    pub event: String,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory lifecycle state for one task
#[derive(Debug, Clone)]
pub struct TaskStateMachine {
    status: TaskStatus,
    metadata: TaskMetadata,
    transitions: Vec<TaskTransition>,
}

impl Default for TaskStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStateMachine {
    /// Create a new task state machine in CREATED
    pub fn new() -> Self {
        Self {
            status: TaskStatus::default(),
            metadata: TaskMetadata::new(Utc::now()),
            transitions: Vec::new(),
        }
    }

    /// Get the current status of the task
    pub fn current_state(&self) -> TaskStatus {
        self.status
    }

    pub fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    /// Counters are written by the task loop; status only changes via `transition`
    pub fn metadata_mut(&mut self) -> &mut TaskMetadata {
        &mut self.metadata
    }

    pub fn transitions(&self) -> &[TaskTransition] {
        &self.transitions
    }

    /// Attempt to transition the task status
    pub fn transition(&mut self, event: &TaskEvent) -> StateMachineResult<TaskStatus> {
        let current_state = self.status;
        let target_state = Self::determine_target_state(current_state, event)?;

        let now = Utc::now();
        self.metadata.touch(now);
        self.status = target_state;
        self.transitions.push(TaskTransition {
            from_state: current_state,
            to_state: target_state,
            event: event.event_type().to_string(),
            transitioned_at: self.metadata.last_updated_at,
        });

        Ok(target_state)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: TaskStatus,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskStatus> {
        let target = match (current_state, event) {
            // Initialization
            (TaskStatus::Created, TaskEvent::Initialize) => TaskStatus::Initializing,
            (TaskStatus::Initializing, TaskEvent::Initialized) => TaskStatus::Created,

            // Run loop entry and re-entry
            (TaskStatus::Created | TaskStatus::Paused, TaskEvent::Start) => TaskStatus::Running,
            (TaskStatus::Running, TaskEvent::Pause) => TaskStatus::Paused,

            // Completion
            (TaskStatus::Running, TaskEvent::Complete) => TaskStatus::Completed,

            // Failure transitions
            (
                TaskStatus::Created | TaskStatus::Initializing | TaskStatus::Running,
                TaskEvent::Fail(_),
            ) => TaskStatus::Failed,

            // Cancel transitions
            (
                TaskStatus::Created
                | TaskStatus::Initializing
                | TaskStatus::Running
                | TaskStatus::Paused,
                TaskEvent::Cancel,
            ) => TaskStatus::Cancelled,

            // Invalid transitions, including anything out of a terminal state
            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Check if the task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the task is currently active
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert_eq!(
            TaskStateMachine::determine_target_state(TaskStatus::Created, &TaskEvent::Start)
                .unwrap(),
            TaskStatus::Running
        );
        assert_eq!(
            TaskStateMachine::determine_target_state(TaskStatus::Paused, &TaskEvent::Start)
                .unwrap(),
            TaskStatus::Running
        );
        assert_eq!(
            TaskStateMachine::determine_target_state(TaskStatus::Running, &TaskEvent::Complete)
                .unwrap(),
            TaskStatus::Completed
        );
        assert_eq!(
            TaskStateMachine::determine_target_state(
                TaskStatus::Initializing,
                &TaskEvent::fail_with_error("bad image")
            )
            .unwrap(),
            TaskStatus::Failed
        );
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let events = [
            TaskEvent::Initialize,
            TaskEvent::Start,
            TaskEvent::Pause,
            TaskEvent::Complete,
            TaskEvent::Fail("again".into()),
            TaskEvent::Cancel,
        ];
        for terminal in [
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            for event in &events {
                assert!(
                    TaskStateMachine::determine_target_state(terminal, event).is_err(),
                    "{terminal} accepted {}",
                    event.event_type()
                );
            }
        }
    }

    #[test]
    fn test_invalid_transitions() {
        // Cannot complete without running
        assert!(
            TaskStateMachine::determine_target_state(TaskStatus::Created, &TaskEvent::Complete)
                .is_err()
        );
        // Cannot pause a task that is not running
        assert!(
            TaskStateMachine::determine_target_state(TaskStatus::Paused, &TaskEvent::Pause)
                .is_err()
        );
    }

    #[test]
    fn test_transition_log_and_timestamps() {
        let mut sm = TaskStateMachine::new();
        let created = sm.metadata().created_at;

        sm.transition(&TaskEvent::Initialize).unwrap();
        sm.transition(&TaskEvent::Initialized).unwrap();
        sm.transition(&TaskEvent::Start).unwrap();
        sm.transition(&TaskEvent::Cancel).unwrap();

        assert_eq!(sm.current_state(), TaskStatus::Cancelled);
        assert!(sm.is_terminal());
        assert!(sm.metadata().last_updated_at >= created);

        let path: Vec<_> = sm.transitions().iter().map(|t| t.to_state).collect();
        assert_eq!(
            path,
            vec![
                TaskStatus::Initializing,
                TaskStatus::Created,
                TaskStatus::Running,
                TaskStatus::Cancelled
            ]
        );
        assert!(sm
            .transitions()
            .windows(2)
            .all(|pair| pair[0].transitioned_at <= pair[1].transitioned_at));

        let err = sm.transition(&TaskEvent::Start).unwrap_err();
        assert_eq!(
            err,
            StateMachineError::InvalidTransition {
                from: "CANCELLED".into(),
                event: "start".into()
            }
        );
        assert_eq!(sm.transitions().len(), 4);
    }
}
