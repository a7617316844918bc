//! # Converter Configuration
//!
//! Typed configuration for the task engine, the synchronous bridge and the
//! three collaborators (model client, code runner, spreadsheet writer).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use image2sheet_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let budget = manager.config().engine.max_iterations;
//! let pool = manager.config().bridge.worker_pool_size;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConverterConfig {
    /// Task loop settings
    pub engine: EngineConfig,

    /// Scheduler and worker pool settings
    pub bridge: BridgeConfig,

    /// Model endpoint settings
    pub model: ModelConfig,

    /// Code runner sandbox settings
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub max_iterations: u32,
    pub iteration_pause_ms: u64,
    pub output_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: constants::DEFAULT_MAX_ITERATIONS,
            iteration_pause_ms: constants::DEFAULT_ITERATION_PAUSE_MS,
            output_dir: PathBuf::from(constants::DEFAULT_OUTPUT_DIR),
        }
    }
}

impl EngineConfig {
    pub fn iteration_pause(&self) -> Duration {
        Duration::from_millis(self.iteration_pause_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub worker_pool_size: usize,
    pub command_buffer_size: usize,
    pub shutdown_timeout_seconds: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: constants::DEFAULT_WORKER_POOL_SIZE,
            command_buffer_size: constants::DEFAULT_COMMAND_BUFFER_SIZE,
            shutdown_timeout_seconds: 10,
        }
    }
}

impl BridgeConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout_seconds: u64,
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            request_timeout_seconds: 120,
            max_tokens: 4096,
        }
    }
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Interpreter executable used for generated code
    pub interpreter: String,
    /// Binding the generated code must leave its table in
    pub output_binding: String,
    /// alias -> module made visible to generated code
    pub allowed_bindings: BTreeMap<String, String>,
    pub timeout_seconds: u64,
    pub max_output_bytes: usize,
    /// Working directory of the child process
    pub working_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            output_binding: constants::DEFAULT_OUTPUT_BINDING.to_string(),
            allowed_bindings: BTreeMap::from([("pd".to_string(), "pandas".to_string())]),
            timeout_seconds: 30,
            max_output_bytes: 8 * 1024 * 1024,
            working_dir: std::env::temp_dir(),
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ConverterConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.engine.max_iterations == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.max_iterations",
                0,
                "at least one iteration is required",
            ));
        }
        if self.bridge.worker_pool_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "bridge.worker_pool_size",
                0,
                "the worker pool needs at least one worker",
            ));
        }
        if self.bridge.command_buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "bridge.command_buffer_size",
                0,
                "the command channel must be bounded above zero",
            ));
        }
        if self.runner.interpreter.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "interpreter",
                "runner",
            ));
        }
        if self.runner.output_binding.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "output_binding",
                "runner",
            ));
        }
        if self
            .runner
            .allowed_bindings
            .contains_key(&self.runner.output_binding)
        {
            return Err(ConfigurationError::invalid_value(
                "runner.output_binding",
                &self.runner.output_binding,
                "collides with an allowed binding alias",
            ));
        }
        if self.runner.timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "runner.timeout_seconds",
                0,
                "generated code needs a non-zero time limit",
            ));
        }
        if self.model.request_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "model.request_timeout_seconds",
                0,
                "model requests need a non-zero time limit",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ConverterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.max_iterations, 3);
        assert_eq!(config.bridge.worker_pool_size, 4);
        assert_eq!(config.runner.output_binding, "df");
        assert_eq!(
            config.runner.allowed_bindings.get("pd").map(String::as_str),
            Some("pandas")
        );
    }

    #[test]
    fn zero_iteration_budget_is_rejected() {
        let mut config = ConverterConfig::default();
        config.engine.max_iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn output_binding_cannot_shadow_a_library() {
        let mut config = ConverterConfig::default();
        config.runner.output_binding = "pd".to_string();
        assert!(config.validate().is_err());
    }
}
