mod llm;
mod loader;

use std::path::Path;

use serde::Deserialize;

pub use llm::{ApiProviderConfig, LlmConfig, LlmProviderConfig, ModelConfig, ProviderType};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub llm: LlmConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::Config;

    #[test]
    fn minimal_config() {
        let config = indoc! {r#"
            [llm.providers.openai]
            type = "openai"
            api_key = "sk-test"

            [llm.providers.openai.models.gpt-4o-mini]
        "#};

        let config: Config = toml::from_str(config).unwrap();

        assert_eq!(config.llm.providers.len(), 1);
        assert!(config.llm.has_providers());
    }

    #[test]
    fn empty_config_has_no_providers() {
        let config: Config = toml::from_str("").unwrap();

        assert!(!config.llm.has_providers());
    }
}
