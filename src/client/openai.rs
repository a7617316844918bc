//! OpenAI-compatible chat completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use super::traits::{extract_code, GeneratedCode, ModelClient};
use crate::config::ModelConfig;
use crate::error::GenerationError;
use crate::prompts::UserPrompt;

/// Client for any endpoint speaking the chat completions protocol
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: Client,
    config: ModelConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    id: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(config: ModelConfig) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GenerationError::Unreachable(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_messages(system_prompt: &str, user_prompt: &UserPrompt) -> Vec<Value> {
        let mut content = vec![json!({ "type": "text", "text": user_prompt.text })];
        if let Some(image) = &user_prompt.image {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": image.data_url() }
            }));
        }

        vec![
            json!({ "role": "system", "content": system_prompt }),
            json!({ "role": "user", "content": content }),
        ]
    }

    fn map_transport_error(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout {
                seconds: self.config.request_timeout_seconds,
            }
        } else {
            GenerationError::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &UserPrompt,
    ) -> Result<GeneratedCode, GenerationError> {
        let request = ChatRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            messages: Self::build_messages(system_prompt, user_prompt),
        };

        let mut builder = self.http.post(self.endpoint()).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Model endpoint rejected request");
            return Err(GenerationError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let code = extract_code(&reply).ok_or(GenerationError::EmptyCode)?;

        debug!(
            completion_id = ?parsed.id,
            code_len = code.len(),
            "Model returned code"
        );

        Ok(GeneratedCode {
            code,
            completion_id: parsed.id,
        })
    }
}
