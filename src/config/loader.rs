//! Configuration Loader
//!
//! Layers built-in defaults, an optional TOML file and `IMAGE2SHEET__*`
//! environment overrides, then validates the result.

use super::error::{ConfigResult, ConfigurationError};
use super::ConverterConfig;
use crate::constants::ENV_PREFIX;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_CONFIG_FILE: &str = "config/image2sheet.toml";
const CONFIG_PATH_VAR: &str = "IMAGE2SHEET_CONFIG";
const LEGACY_API_KEY_VAR: &str = "OPENAI_COMPATIBLE_API_KEY";

/// Loaded, validated configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: ConverterConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from `IMAGE2SHEET_CONFIG` or `config/image2sheet.toml`
    /// when present, falling back to defaults plus environment overrides.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        // Secrets traditionally live in a .env file next to the service
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        match env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::load_from_path(path),
            Err(_) => Self::build(Some(Path::new(DEFAULT_CONFIG_FILE)), false),
        }
    }

    /// Load configuration from an explicit file, which must exist
    pub fn load_from_path(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }
        Self::build(Some(path), true)
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: ConverterConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            source: None,
        }))
    }

    fn build(file: Option<&Path>, required: bool) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&ConverterConfig::default())?);

        let source = file.filter(|path| required || path.is_file());
        if let Some(path) = source {
            debug!("Reading configuration file {}", path.display());
            builder = builder.add_source(File::from(path).required(required));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: ConverterConfig = builder.build()?.try_deserialize()?;

        if config.model.api_key.is_none() {
            config.model.api_key = env::var(LEGACY_API_KEY_VAR).ok();
        }

        config.validate()?;

        let manager = ConfigManager {
            config,
            source: source.map(Path::to_path_buf),
        };
        info!(
            source = ?manager.source,
            config = %manager.debug_config(),
            "⚙️ CONFIG: Configuration loaded"
        );
        Ok(Arc::new(manager))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// File the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Configuration rendered as JSON with secrets masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null);
        sanitize_json_recursive(&mut value);
        value
    }
}

/// Mask every field whose name suggests a credential
fn sanitize_json_recursive(value: &mut serde_json::Value) {
    const SENSITIVE: [&str; 4] = ["key", "secret", "token", "password"];

    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key = key.to_lowercase();
                if SENSITIVE.iter().any(|pattern| key.contains(pattern)) {
                    if let serde_json::Value::String(s) = val {
                        let chars: Vec<char> = s.chars().collect();
                        let masked = if chars.len() > 4 {
                            let head: String = chars[..2].iter().collect();
                            let tail: String = chars[chars.len() - 2..].iter().collect();
                            format!("[MASKED: {head}***{tail}]")
                        } else {
                            "[MASKED]".to_string()
                        };
                        *val = serde_json::Value::String(masked);
                    }
                } else {
                    sanitize_json_recursive(val);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(sanitize_json_recursive),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_masked_in_debug_output() {
        let mut config = ConverterConfig::default();
        config.model.api_key = Some("sk-abcdefgh".to_string());
        let manager = ConfigManager::from_config(config).unwrap();

        let rendered = manager.debug_config();
        assert_eq!(rendered["model"]["api_key"], "[MASKED: sk***gh]");
        assert_eq!(rendered["model"]["model"], "gpt-4o");
    }

    #[test]
    fn from_config_validates() {
        let mut config = ConverterConfig::default();
        config.bridge.worker_pool_size = 0;
        assert!(ConfigManager::from_config(config).is_err());
    }
}
