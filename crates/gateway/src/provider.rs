//! Vendor adapters: each [`Provider`] owns the executors for one vendor and
//! knows how to construct them from configuration.

pub(crate) mod google;
pub(crate) mod openai;

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    client::{ChatClient, ModelSettings},
    error::{GatewayError, Result},
};

/// Wire protocol selector for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Openai,
    /// DeepSeek speaks the OpenAI chat-completions protocol; only the
    /// default endpoint differs.
    Deepseek,
    Google,
}

impl ProviderKind {
    fn default_base_url(self) -> &'static str {
        match self {
            Self::Openai => openai::DEFAULT_OPENAI_API_URL,
            Self::Deepseek => openai::DEFAULT_DEEPSEEK_API_URL,
            Self::Google => google::DEFAULT_GOOGLE_API_URL,
        }
    }

    fn build_client(self, settings: ModelSettings) -> Result<Arc<dyn ChatClient>> {
        match self {
            Self::Openai | Self::Deepseek => Ok(Arc::new(openai::OpenAiClient::new(settings)?)),
            Self::Google => Ok(Arc::new(google::GoogleClient::new(settings)?)),
        }
    }
}

impl From<config::ProviderType> for ProviderKind {
    fn from(provider_type: config::ProviderType) -> Self {
        match provider_type {
            config::ProviderType::Openai => Self::Openai,
            config::ProviderType::Deepseek => Self::Deepseek,
            config::ProviderType::Google => Self::Google,
        }
    }
}

/// Adapter for one vendor: owns its model executors for the adapter's
/// lifetime.
#[derive(Debug)]
pub struct Provider {
    name: String,
    kind: ProviderKind,
    clients: BTreeMap<String, Arc<dyn ChatClient>>,
}

impl Provider {
    /// Build an adapter from one vendor's configuration.
    ///
    /// Model construction is best-effort: a model that fails to initialize is
    /// logged and skipped, and the rest of the batch still registers.
    pub fn from_config(name: impl Into<String>, provider_config: &config::LlmProviderConfig) -> Self {
        let name = name.into();
        let kind = ProviderKind::from(provider_config.provider_type());

        let mut provider = Self {
            name,
            kind,
            clients: BTreeMap::new(),
        };

        for (model_name, model_config) in provider_config.models() {
            let settings = match resolve_settings(&provider.name, kind, model_name, model_config, provider_config) {
                Ok(settings) => settings,
                Err(error) => {
                    log::error!(
                        "failed to configure model {model_name} for provider {}: {error}",
                        provider.name
                    );
                    continue;
                }
            };

            if let Err(error) = provider.register_model(settings) {
                log::error!(
                    "failed to register model {model_name} for provider {}: {error}",
                    provider.name
                );
            }
        }

        provider
    }

    #[cfg(test)]
    pub(crate) fn with_clients(
        name: impl Into<String>,
        kind: ProviderKind,
        clients: Vec<Arc<dyn ChatClient>>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            clients: clients
                .into_iter()
                .map(|client| (client.model().to_string(), client))
                .collect(),
        }
    }

    /// Construct and store one executor, keyed by its routable model name.
    pub fn register_model(&mut self, settings: ModelSettings) -> Result<()> {
        let client = self.kind.build_client(settings)?;
        let model = client.model().to_string();

        log::debug!("registered model {model} for provider {}", self.name);
        self.clients.insert(model, client);

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Look up the executor for a model of this vendor.
    pub fn client(&self, model: &str) -> Result<Arc<dyn ChatClient>> {
        match self.clients.get(model) {
            Some(client) => {
                if !client.is_available() {
                    log::warn!("model {model} of provider {} is marked unavailable", self.name);
                }
                Ok(client.clone())
            }
            None => Err(GatewayError::ModelNotFound(model.to_string())),
        }
    }

    /// Resolved settings of one model.
    pub fn model_settings(&self, model: &str) -> Result<ModelSettings> {
        let client = self.client(model)?;
        Ok(client.settings().clone())
    }

    /// Models whose executor currently reports available, in stable (sorted)
    /// order.
    pub fn available_models(&self) -> Vec<String> {
        self.clients
            .iter()
            .filter(|(_, client)| client.is_available())
            .map(|(model, _)| model.clone())
            .collect()
    }

    /// All configured models, regardless of availability.
    pub fn model_names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    /// Capture the availability of every owned executor.
    pub fn health_check(&self) -> BTreeMap<String, bool> {
        self.clients
            .iter()
            .map(|(model, client)| (model.clone(), client.is_available()))
            .collect()
    }

    /// Take this adapter out of service: every executor is marked unavailable
    /// so holders of previously resolved handles stop routing to them.
    /// Transport resources are released when the adapter is dropped.
    pub fn close(&self) {
        for client in self.clients.values() {
            client.set_available(false);
        }

        log::debug!("closed provider {}", self.name);
    }
}

fn resolve_settings(
    provider: &str,
    kind: ProviderKind,
    model_name: &str,
    model_config: &config::ModelConfig,
    provider_config: &config::LlmProviderConfig,
) -> Result<ModelSettings> {
    let api_key = model_config
        .api_key
        .clone()
        .or_else(|| provider_config.api_key().cloned())
        .ok_or_else(|| GatewayError::api(format!("no API key configured for model {model_name}")))?;

    let base_url = model_config
        .base_url
        .clone()
        .or_else(|| provider_config.base_url().map(str::to_string))
        .unwrap_or_else(|| kind.default_base_url().to_string());

    Ok(ModelSettings {
        model: model_name.to_string(),
        rename: model_config.rename.clone(),
        provider: provider.to_string(),
        api_key,
        base_url,
        timeout: model_config.timeout,
        max_retries: model_config.max_retries,
        max_concurrent_calls: model_config.max_concurrent_calls,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use indoc::indoc;

    use super::*;
    use crate::test_support::{Behavior, ScriptedClient};

    fn provider_config(toml: &str) -> config::LlmProviderConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn builds_all_configured_models() {
        let config = provider_config(indoc! {r#"
            type = "openai"
            api_key = "sk-test"

            [models.gpt-4o]

            [models.gpt-4o-mini]
        "#});

        let provider = Provider::from_config("openai", &config);

        assert_eq!(provider.model_names(), ["gpt-4o", "gpt-4o-mini"]);
        assert_eq!(provider.available_models(), ["gpt-4o", "gpt-4o-mini"]);
    }

    #[test]
    fn batch_construction_skips_broken_models() {
        // gpt-4o has no key anywhere and cannot be configured; the rest of
        // the batch must still come up.
        let config = provider_config(indoc! {r#"
            type = "openai"

            [models.gpt-4o]

            [models.gpt-4o-mini]
            api_key = "sk-model"
        "#});

        let provider = Provider::from_config("openai", &config);

        assert_eq!(provider.model_names(), ["gpt-4o-mini"]);
    }

    #[test]
    fn unknown_model_lookup_fails() {
        let config = provider_config(indoc! {r#"
            type = "deepseek"
            api_key = "sk-test"

            [models.deepseek-chat]
        "#});

        let provider = Provider::from_config("deepseek", &config);

        assert!(provider.client("deepseek-chat").is_ok());

        let error = provider.client("deepseek-reasoner").unwrap_err();
        assert!(matches!(error, GatewayError::ModelNotFound(_)));
    }

    #[test]
    fn settings_resolve_overrides_and_defaults() {
        let config = provider_config(indoc! {r#"
            type = "deepseek"
            api_key = "sk-provider"

            [models.deepseek-chat]

            [models.deepseek-reasoner]
            base_url = "https://alt.deepseek.example/v1"
            rename = "deepseek-reasoner-latest"
        "#});

        let provider = Provider::from_config("deepseek", &config);

        let chat = provider.model_settings("deepseek-chat").unwrap();
        assert_eq!(chat.base_url, "https://api.deepseek.com/v1");
        assert_eq!(chat.wire_model(), "deepseek-chat");
        assert_eq!(chat.provider, "deepseek");

        let reasoner = provider.model_settings("deepseek-reasoner").unwrap();
        assert_eq!(reasoner.base_url, "https://alt.deepseek.example/v1");
        assert_eq!(reasoner.wire_model(), "deepseek-reasoner-latest");
    }

    #[test]
    fn available_models_excludes_unavailable_executors() {
        let provider = Provider::with_clients(
            "openai",
            ProviderKind::Openai,
            vec![
                Arc::new(ScriptedClient::new("openai", "gpt-4o", Behavior::Succeed("ok".into()))),
                Arc::new(ScriptedClient::unavailable("openai", "gpt-4o-mini")),
            ],
        );

        assert_eq!(provider.available_models(), ["gpt-4o"]);
        assert_eq!(provider.model_names(), ["gpt-4o", "gpt-4o-mini"]);

        let health = provider.health_check();
        assert!(health["gpt-4o"]);
        assert!(!health["gpt-4o-mini"]);
    }

    #[test]
    fn close_marks_every_executor_unavailable() {
        let client = Arc::new(ScriptedClient::new("openai", "gpt-4o", Behavior::Succeed("ok".into())));
        let provider = Provider::with_clients("openai", ProviderKind::Openai, vec![client.clone()]);

        provider.close();

        assert!(!client.is_available());
        assert!(provider.available_models().is_empty());
    }
}
