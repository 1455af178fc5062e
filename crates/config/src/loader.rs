use std::path::Path;

use anyhow::{Context, bail};
use indoc::indoc;

use crate::Config;

pub(crate) fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration from {}", path.display()))?;

    let config: Config = toml::from_str(&content)?;

    validate_has_providers(&config)?;

    for warning in validate_models(&config) {
        log::warn!("{warning}");
    }

    Ok(config)
}

pub(crate) fn validate_has_providers(config: &Config) -> anyhow::Result<()> {
    if !config.llm.has_providers() {
        bail!(indoc! {r#"
            No LLM providers configured. The gateway requires at least one provider to function.

            Example configuration:

              [llm.providers.openai]
              type = "openai"
              api_key = "sk-..."

              [llm.providers.openai.models.gpt-4o-mini]
        "#});
    }

    Ok(())
}

/// Non-fatal configuration problems, reported as warnings at load time.
pub(crate) fn validate_models(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut claimed: Vec<(&str, &str)> = Vec::new();

    for (provider_name, provider_config) in &config.llm.providers {
        let api = provider_config.api();

        if api.models.is_empty() {
            warnings.push(format!(
                "provider '{provider_name}' has no models configured and will never serve a request"
            ));
        }

        if api.api_key.is_none() && api.models.values().any(|m| m.api_key.is_none()) {
            warnings.push(format!(
                "provider '{provider_name}' has neither a provider-level nor a per-model API key for every model"
            ));
        }

        for (model_name, model_config) in &api.models {
            if model_config.max_retries == 0 {
                warnings.push(format!(
                    "model '{model_name}' of provider '{provider_name}' has max_retries = 0; every call will fail without reaching the provider"
                ));
            }

            if let Some((other, _)) = claimed.iter().find(|(_, m)| *m == model_name.as_str()) {
                warnings.push(format!(
                    "model '{model_name}' is configured under both '{other}' and '{provider_name}'; registration of the latter will be rejected"
                ));
            } else {
                claimed.push((provider_name, model_name));
            }
        }
    }

    warnings
}
