use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::state_machine::TaskStatus;

/// One task status change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
    /// One of the `task.*` names in [`crate::constants::events`]
    pub name: &'static str,
    pub task_id: String,
    pub owner: String,
    pub status: TaskStatus,
    pub message: String,
    pub published_at: DateTime<Utc>,
}

/// Broadcast channel for task lifecycle events
#[derive(Debug, Clone)]
pub struct LifecyclePublisher {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecyclePublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(
        &self,
        name: &'static str,
        task_id: &str,
        owner: &str,
        status: TaskStatus,
        message: impl Into<String>,
    ) {
        let event = LifecycleEvent {
            name,
            task_id: task_id.to_string(),
            owner: owner.to_string(),
            status,
            message: message.into(),
            published_at: Utc::now(),
        };
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecyclePublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::events;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let publisher = LifecyclePublisher::default();
        let mut rx = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 1);

        publisher.publish(
            events::TASK_STARTED,
            "task_0000abcd",
            "alice",
            TaskStatus::Running,
            "Task started",
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "task.started");
        assert_eq!(event.status, TaskStatus::Running);
        assert_eq!(event.owner, "alice");
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        LifecyclePublisher::new(0).publish(
            events::TASK_CREATED,
            "task_0000abcd",
            "alice",
            TaskStatus::Created,
            "created",
        );
    }
}
