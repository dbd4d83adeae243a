//! LLM provider configuration.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::anthropic::AnthropicClient;
use super::client::{LlmClient, LlmError};
use super::ollama::OllamaClient;

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Anthropic Claude API.
    Anthropic,
    /// Local Ollama instance.
    #[default]
    Ollama,
}

/// LLM client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider.
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name/identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key (required for anthropic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API base URL (for proxies or self-hosted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Transport timeout in seconds. Task timeouts apply on top of this.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            api_key: None,
            api_base: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Build the client for the configured provider.
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.provider {
        LlmProvider::Anthropic => {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| LlmError::NotConfigured("anthropic requires llm.api_key".into()))?;
            let mut client = AnthropicClient::new(api_key, &config.model).with_timeout(timeout);
            if let Some(ref base) = config.api_base {
                client = client.with_api_base(base);
            }
            Ok(Arc::new(client))
        }
        LlmProvider::Ollama => {
            let mut client = OllamaClient::new(&config.model).with_timeout(timeout);
            if let Some(ref base) = config.api_base {
                client = client.with_api_base(base);
            }
            Ok(Arc::new(client))
        }
    }
}
