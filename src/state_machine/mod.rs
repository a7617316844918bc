// State machine module for task lifecycle management
//
// Status, events and the transition table for a conversion task. Transitions are
// applied in memory by the task's own execution path.

pub mod errors;
pub mod events;
pub mod states;
pub mod task_state_machine;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::TaskEvent;
pub use states::TaskStatus;
pub use task_state_machine::{TaskStateMachine, TaskTransition};
