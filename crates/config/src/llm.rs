//! LLM provider configuration for the gateway.

use std::{collections::BTreeMap, time::Duration};

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;

/// Configuration for an individual model within a provider.
///
/// Every field except `rename` has a default, so `[llm.providers.x.models.y]`
/// with no keys is a valid model entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Optional rename - the actual provider model name.
    /// If not specified, the model ID (map key) is used.
    pub rename: Option<String>,
    /// Per-model API key, overriding the provider-level key.
    pub api_key: Option<SecretString>,
    /// Per-model base URL, overriding the provider-level URL.
    pub base_url: Option<String>,
    /// Outbound request timeout, e.g. `"30s"`.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub timeout: Duration,
    /// Number of attempts for a non-streaming call before the model is
    /// marked unavailable.
    pub max_retries: u32,
    /// Sizes the connection pool for this model's transport.
    pub max_concurrent_calls: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            rename: None,
            api_key: None,
            base_url: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            max_concurrent_calls: 10,
        }
    }
}

/// Configuration shared by all API-based providers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiProviderConfig {
    /// API key for authentication.
    pub api_key: Option<SecretString>,

    /// Custom base URL for the provider API.
    pub base_url: Option<String>,

    /// Explicitly configured models for this provider. Keys are unique by
    /// construction; each key becomes a routable model name.
    pub models: BTreeMap<String, ModelConfig>,
}

/// Provider type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    /// OpenAI provider.
    Openai,
    /// DeepSeek provider (OpenAI-compatible wire protocol).
    Deepseek,
    /// Google Gemini provider.
    Google,
}

/// Complete LLM provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum LlmProviderConfig {
    /// OpenAI provider configuration.
    Openai(ApiProviderConfig),

    /// DeepSeek provider configuration.
    Deepseek(ApiProviderConfig),

    /// Google Gemini provider configuration.
    Google(ApiProviderConfig),
}

impl LlmProviderConfig {
    /// Get the provider type for this configuration.
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::Openai(_) => ProviderType::Openai,
            Self::Deepseek(_) => ProviderType::Deepseek,
            Self::Google(_) => ProviderType::Google,
        }
    }

    /// The API-level settings, independent of provider type.
    pub fn api(&self) -> &ApiProviderConfig {
        match self {
            Self::Openai(config) | Self::Deepseek(config) | Self::Google(config) => config,
        }
    }

    /// Get the provider-level API key.
    pub fn api_key(&self) -> Option<&SecretString> {
        self.api().api_key.as_ref()
    }

    /// Get the provider-level base URL.
    pub fn base_url(&self) -> Option<&str> {
        self.api().base_url.as_deref()
    }

    /// Get the configured models for this provider.
    pub fn models(&self) -> &BTreeMap<String, ModelConfig> {
        &self.api().models
    }
}

/// LLM configuration for the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Map of LLM provider configurations, in declaration order.
    pub providers: IndexMap<String, LlmProviderConfig>,
}

impl LlmConfig {
    /// Whether there are any LLM providers configured.
    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }
}
