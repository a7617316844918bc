//! # Model Client Traits

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::prompts::UserPrompt;

/// Code returned by the model for one iteration
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedCode {
    pub code: String,
    /// Provider-side identifier of the completion, when there is one
    pub completion_id: Option<String>,
}

/// Generates code from a prompt pair.
///
/// Implementations must fail with [`GenerationError::EmptyCode`] rather than
/// return blank code.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &UserPrompt,
    ) -> Result<GeneratedCode, GenerationError>;
}

/// Pull the code out of a model reply.
///
/// Replies usually wrap the code in a fenced block; the first fenced block wins
/// and an unfenced reply is taken whole.
pub fn extract_code(reply: &str) -> Option<String> {
    let code = match reply.find("```") {
        Some(start) => {
            let after_fence = &reply[start + 3..];
            // Skip the info string (e.g. "python") up to the end of the line
            let body_start = after_fence.find('\n').map_or(after_fence.len(), |i| i + 1);
            let body = &after_fence[body_start..];
            match body.find("```") {
                Some(end) => &body[..end],
                None => body,
            }
        }
        None => reply,
    };

    let code = code.trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}
