//! # Code Execution
//!
//! The isolation boundary for generated code. The task engine only sees the
//! [`CodeRunner`] trait; [`ProcessCodeRunner`] implements it by running the code in
//! a separate interpreter process with an allow-listed set of library bindings.

pub mod code_runner;
pub mod process_runner;

pub use code_runner::{CodeRunner, RunOutput};
pub use process_runner::ProcessCodeRunner;
