//! # Task Model
//!
//! Bookkeeping attached to every conversion task and the read-only views of it
//! handed back to callers of the control surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::state_machine::TaskStatus;

/// Counters and timestamps maintained by the task's own execution path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub created_at: DateTime<Utc>,
    /// Never moves backwards, even if the wall clock does
    pub last_updated_at: DateTime<Utc>,
    /// Number of generate attempts, successful or not
    pub total_iterations: u32,
    /// Number of the most recent iteration with generated code
    pub current_iteration: u32,
    pub error_count: u32,
}

impl TaskMetadata {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_updated_at: now,
            total_iterations: 0,
            current_iteration: 0,
            error_count: 0,
        }
    }

    /// Advance `last_updated_at` to `now` unless that would move it backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated_at {
            self.last_updated_at = now;
        }
    }
}

/// Snapshot returned by `get_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusReport {
    pub task_id: String,
    pub owner: String,
    pub file_name: String,
    pub status: TaskStatus,
    pub metadata: TaskMetadata,
    pub max_iterations: u32,
    pub last_error: Option<String>,
    /// Message of the most recent generate/execute/export outcome
    pub last_message: Option<String>,
    pub output_file: Option<PathBuf>,
}

/// Condensed entry returned by `list_tasks`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub file_name: String,
    pub status: TaskStatus,
    pub metadata: TaskMetadata,
}

impl From<&TaskStatusReport> for TaskSummary {
    fn from(report: &TaskStatusReport) -> Self {
        Self {
            task_id: report.task_id.clone(),
            file_name: report.file_name.clone(),
            status: report.status,
            metadata: report.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn touch_never_moves_backwards() {
        let now = Utc::now();
        let mut metadata = TaskMetadata::new(now);

        metadata.touch(now - Duration::seconds(5));
        assert_eq!(metadata.last_updated_at, now);

        let later = now + Duration::seconds(5);
        metadata.touch(later);
        assert_eq!(metadata.last_updated_at, later);
        assert_eq!(metadata.created_at, now);
    }
}
