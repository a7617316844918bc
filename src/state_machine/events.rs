use serde::{Deserialize, Serialize};

/// Events that can trigger task status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// Begin preparing prompts
    Initialize,
    /// Prompts prepared
    Initialized,
    /// Enter or re-enter the run loop
    Start,
    /// Stop at the next iteration boundary
    Pause,
    /// Spreadsheet exported
    Complete,
    /// Terminal failure with a message
    Fail(String),
    /// Cancellation observed
    Cancel,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Initialized => "initialized",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
