#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Image2Sheet Core
//!
//! Task orchestration engine that turns a photographed or scanned table into a
//! spreadsheet. A model writes extraction code, the code runs in an isolated
//! interpreter, and the resulting table is exported; failed runs feed a
//! correction prompt into the next attempt.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Task loop, scheduler thread, worker pool and the synchronous [`TaskManager`]
//! - [`state_machine`] - Task status transitions
//! - [`client`] - Model client trait and the chat-completions implementation
//! - [`execution`] - Code runner trait and the subprocess implementation
//! - [`export`] - Spreadsheet writer trait and the xlsx implementation
//! - [`prompts`] - System, initial and correction prompts
//! - [`registry`] - Owner → task registry held by the scheduler
//! - [`events`] - Update hooks and lifecycle broadcast
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use image2sheet_core::config::ConfigManager;
//! use image2sheet_core::events::TracingHook;
//! use image2sheet_core::{init_structured_logging, TaskManager};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! init_structured_logging();
//! let config = ConfigManager::load()?;
//! let manager = TaskManager::from_config(config.config())?;
//!
//! let task_id = manager.create_task("alice", "uploads/invoice.png", "invoice.png", Arc::new(TracingHook))?;
//! manager.start_task("alice", &task_id)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod execution;
pub mod export;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod prompts;
pub mod registry;
pub mod state_machine;

pub use client::{ModelClient, OpenAiCompatibleClient};
pub use config::{ConfigManager, ConverterConfig};
pub use error::{
    BridgeError, ConverterError, ExecutionError, ExportError, GenerationError, Result,
};
pub use events::{TracingHook, UpdateHook};
pub use execution::{CodeRunner, ProcessCodeRunner};
pub use export::{SpreadsheetWriter, XlsxSheetWriter};
pub use logging::init_structured_logging;
pub use models::{IterationRecord, TableArtifact, TaskStatusReport, TaskSummary};
pub use orchestration::{Collaborators, TaskManager};
pub use state_machine::TaskStatus;
