mod common;

use common::strategies::*;
use image2sheet_core::models::IterationRecord;
use image2sheet_core::prompts::build_correction_prompt;
use image2sheet_core::state_machine::{TaskStateMachine, TaskStatus};
use proptest::prelude::*;

proptest! {
    /// Property: error text is always rendered before feedback text
    #[test]
    fn error_precedes_feedback_in_correction_prompt(
        error in prose_strategy(),
        feedback in prose_strategy(),
        iteration in 1u32..10,
    ) {
        let mut record = IterationRecord::new(iteration, "df = pd.DataFrame()");
        record.error_message = Some(format!("ERR-{error}"));
        record.user_feedback = Some(format!("FB-{feedback}"));

        let prompt = build_correction_prompt(&record, "df");
        let error_at = prompt.find("ERR-").unwrap();
        let feedback_at = prompt.find("FB-").unwrap();
        prop_assert!(error_at < feedback_at);
        let expected_error = format!("ERR-{error}");
        let expected_feedback = format!("FB-{feedback}");
        prop_assert!(prompt.contains(&expected_error));
        prop_assert!(prompt.contains(&expected_feedback));
    }

    /// Property: every combination of inputs yields the closing requirements
    #[test]
    fn correction_prompt_always_closes_with_requirements(
        error in optional_prose_strategy(),
        feedback in optional_prose_strategy(),
        output in optional_prose_strategy(),
    ) {
        let mut record = IterationRecord::new(1, "df = None");
        record.error_message = error;
        record.user_feedback = feedback;
        record.execution_output = output;

        let prompt = build_correction_prompt(&record, "result");
        prop_assert!(prompt.contains("assigned to `result`"));
        prop_assert!(prompt.trim_end().ends_with("4. No rows or columns are truncated"));
    }

    /// Property: once terminal, no event moves the task again
    #[test]
    fn terminal_states_absorb_every_event(events in prop::collection::vec(task_event_strategy(), 1..40)) {
        let mut machine = TaskStateMachine::new();
        let mut terminal_at: Option<usize> = None;

        for event in &events {
            let applied = machine.transition(event);
            if terminal_at.is_some() {
                prop_assert!(applied.is_err());
            }
            if terminal_at.is_none() && machine.is_terminal() {
                terminal_at = Some(machine.transitions().len());
            }
        }

        if let Some(count) = terminal_at {
            prop_assert_eq!(machine.transitions().len(), count);
        }
        let completions = machine
            .transitions()
            .iter()
            .filter(|t| t.to_state == TaskStatus::Completed)
            .count();
        prop_assert!(completions <= 1);
        prop_assert!(machine
            .transitions()
            .windows(2)
            .all(|pair| pair[0].transitioned_at <= pair[1].transitioned_at
                && pair[0].to_state == pair[1].from_state));
    }
}
