//! # Model Client
//!
//! The collaborator that turns a system prompt and a user prompt into generated
//! code. Clients own no retry policy; the task loop decides whether to try again.

pub mod openai;
pub mod traits;

pub use openai::OpenAiCompatibleClient;
pub use traits::{extract_code, GeneratedCode, ModelClient};
