//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;
use crate::types::ExecutionMode;

/// Engine configuration surface. All fields have serde defaults so a
/// partial config file deserializes into a complete value.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Default LM model.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Cap on LM calls per agent-loop turn.
    #[serde(default = "default_max_agent_turns")]
    pub max_agent_turns: u32,
    /// Default execution mode when neither the request nor the skill
    /// overrides it.
    #[serde(default = "default_execution_mode")]
    pub execution_mode: ExecutionMode,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Fallback skill when no triggers match.
    #[serde(default)]
    pub default_skill_id: Option<String>,
    /// Preamble prepended to every system prompt.
    #[serde(default)]
    pub base_prompt: Option<String>,
    /// Upper bound on the user utterance, in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    /// Upper bound on inbound payloads, enforced at the transport
    /// boundary.
    #[serde(default = "default_max_request_body_size")]
    pub max_request_body_size: usize,
    /// CORS allow-list for the transport; empty rejects cross-origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_agent_turns: default_max_agent_turns(),
            execution_mode: default_execution_mode(),
            request_timeout_secs: default_request_timeout_secs(),
            default_skill_id: None,
            base_prompt: None,
            max_message_length: default_max_message_length(),
            max_request_body_size: default_max_request_body_size(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_agent_turns() -> u32 {
    10
}

fn default_execution_mode() -> ExecutionMode {
    ExecutionMode::Expert
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_message_length() -> usize {
    10_000
}

fn default_max_request_body_size() -> usize {
    1024 * 1024
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.model.is_empty() {
            return Err(EngineError::Configuration("model must be set".to_string()));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(EngineError::Configuration(format!(
                "temperature {} is out of range [0, 2]",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(EngineError::Configuration(
                "max_tokens must be positive".to_string(),
            ));
        }
        if self.max_agent_turns == 0 {
            return Err(EngineError::Configuration(
                "max_agent_turns must be positive".to_string(),
            ));
        }
        if self.max_message_length == 0 {
            return Err(EngineError::Configuration(
                "max_message_length must be positive".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(EngineError::Configuration(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_agent_turns, 10);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.execution_mode, ExecutionMode::Expert);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"model":"gpt-4o","max_agent_turns":3}"#).expect("parse");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_agent_turns, 3);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.max_message_length, 10_000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.temperature = 3.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.max_agent_turns = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.model = String::new();
        assert!(config.validate().is_err());
    }
}
