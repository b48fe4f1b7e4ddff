//! Configuration loading — a TOML file with sensible defaults.
//!
//! The API key never lives in the file; the config names an environment
//! variable and the key is read at wiring time.

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {detail}")]
    Parse { path: String, detail: String },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    /// Chat-completions API root, e.g. `http://localhost:8080/v1`.
    pub base_url: String,
    /// Environment variable holding the API key, if the endpoint needs one.
    pub api_key_env: Option<String>,
    pub max_iterations: usize,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub retry: RetrySettings,
    /// Named cooperating-agent profiles for delegation.
    pub sub_agents: BTreeMap<String, SubAgentSettings>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            base_url: "http://localhost:8080/v1".into(),
            api_key_env: None,
            max_iterations: 20,
            max_tokens: None,
            temperature: None,
            retry: RetrySettings::default(),
            sub_agents: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            initial_delay_ms: defaults.initial_delay_ms,
            backoff_multiplier: defaults.backoff_multiplier,
            max_delay_ms: defaults.max_delay_ms,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay_ms: settings.initial_delay_ms,
            backoff_multiplier: settings.backoff_multiplier,
            max_delay_ms: settings.max_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubAgentSettings {
    pub system_prompt: String,
    /// Overrides the top-level model when set.
    pub model: Option<String>,
    pub max_iterations: Option<usize>,
}

impl AgentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            detail: e.to_string(),
        })
    }

    /// Missing file falls back to defaults; a present-but-broken file is
    /// still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        std::fs::write(path, raw).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Resolve the API key through the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }

    pub fn retry_config(&self) -> RetryConfig {
        (&self.retry).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = AgentConfig::default();
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.retry_config().max_retries, 3);
    }

    #[test]
    fn parses_partial_toml() {
        let config: AgentConfig = toml::from_str(
            r#"
            model = "qwen2.5-coder"
            base_url = "http://localhost:11434/v1"

            [retry]
            max_retries = 5

            [sub_agents.researcher]
            system_prompt = "You research things."
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "qwen2.5-coder");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert!(config.sub_agents.contains_key("researcher"));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = AgentConfig::default();
        config.model = "test".into();
        let raw = toml::to_string_pretty(&config).unwrap();
        let back: AgentConfig = toml::from_str(&raw).unwrap();
        assert_eq!(back.model, "test");
    }
}
