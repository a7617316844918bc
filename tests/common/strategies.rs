//! Proptest strategies for prompts and lifecycle events.

use image2sheet_core::state_machine::TaskEvent;
use proptest::prelude::*;

/// Lowercase words, never containing the markers tests search for
pub fn prose_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z ]{0,39}".prop_map(|s| s.trim_end().to_string())
}

pub fn optional_prose_strategy() -> impl Strategy<Value = Option<String>> {
    proptest::option::of(prose_strategy())
}

pub fn task_event_strategy() -> impl Strategy<Value = TaskEvent> {
    prop_oneof![
        Just(TaskEvent::Initialize),
        Just(TaskEvent::Initialized),
        Just(TaskEvent::Start),
        Just(TaskEvent::Pause),
        Just(TaskEvent::Complete),
        prose_strategy().prop_map(TaskEvent::Fail),
        Just(TaskEvent::Cancel),
    ]
}
