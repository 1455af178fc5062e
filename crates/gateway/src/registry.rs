//! Process-wide directory of vendor adapters.
//!
//! The registry is an explicitly constructed value owned by the composition
//! root and handed around by reference or `Arc` — there is no hidden global.
//! One lock guards the adapter table, so concurrent registration and lookup
//! never observe a partially updated map.

use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use indexmap::IndexMap;
use itertools::Itertools;

use crate::{
    client::ChatClient,
    error::{GatewayError, Result},
    provider::Provider,
};

#[derive(Default)]
pub struct Registry {
    providers: RwLock<IndexMap<String, Arc<Provider>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration, one adapter per configured
    /// vendor. Construction is best-effort: a vendor that fails to register
    /// is logged and the rest still come up.
    pub fn from_config(config: &config::LlmConfig) -> Self {
        let registry = Self::new();

        for (name, provider_config) in &config.providers {
            log::debug!("initializing provider: {name}");

            let provider = Provider::from_config(name.clone(), provider_config);

            if let Err(error) = registry.register_provider(provider) {
                log::error!("failed to register provider {name}: {error}");
            }
        }

        registry
    }

    fn read_providers(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<Provider>>> {
        self.providers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_providers(&self) -> RwLockWriteGuard<'_, IndexMap<String, Arc<Provider>>> {
        self.providers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an adapter under its vendor name, replacing any previous
    /// adapter of that name.
    ///
    /// A model name may only be claimed by one vendor: registration is
    /// rejected when a *different* vendor already exposes one of the incoming
    /// adapter's models, so model-based routing stays unambiguous.
    pub fn register_provider(&self, provider: Provider) -> Result<()> {
        let mut providers = self.write_providers();
        let name = provider.name().to_string();

        for model in provider.model_names() {
            let claimant = providers
                .iter()
                .find(|(existing_name, existing)| *existing_name != &name && existing.model_names().contains(&model));

            if let Some((existing_name, _)) = claimant {
                return Err(GatewayError::DuplicateModel {
                    model,
                    existing_provider: existing_name.clone(),
                });
            }
        }

        log::debug!("provider {name} registered");
        providers.insert(name, Arc::new(provider));

        Ok(())
    }

    /// Look up an adapter by vendor name.
    pub fn provider(&self, name: &str) -> Result<Arc<Provider>> {
        let providers = self.read_providers();

        match providers.get(name) {
            Some(provider) => Ok(provider.clone()),
            None => {
                log::debug!(
                    "provider '{name}' not found. Registered providers: [{}]",
                    providers.keys().join(", ")
                );

                Err(GatewayError::ProviderNotFound(name.to_string()))
            }
        }
    }

    /// Find which vendor currently serves `model`: a linear scan over the
    /// adapters' available-model lists in registration order.
    pub fn find_model_provider(&self, model: &str) -> Option<String> {
        self.read_providers()
            .iter()
            .find(|(_, provider)| provider.available_models().iter().any(|m| m == model))
            .map(|(name, _)| name.clone())
    }

    /// Resolve a model name to its executor without the caller knowing the
    /// vendor.
    pub fn client_by_model(&self, model: &str) -> Result<Arc<dyn ChatClient>> {
        let provider_name = self
            .find_model_provider(model)
            .ok_or_else(|| GatewayError::ModelNotFound(model.to_string()))?;

        self.provider(&provider_name)?.client(model)
    }

    /// Available models of every registered vendor.
    pub fn all_models(&self) -> BTreeMap<String, Vec<String>> {
        self.read_providers()
            .iter()
            .map(|(name, provider)| (name.clone(), provider.available_models()))
            .collect()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.read_providers().keys().cloned().collect()
    }

    /// Health of every model of every vendor. Total: one entry per vendor,
    /// and never fails.
    pub fn health_check_all(&self) -> BTreeMap<String, BTreeMap<String, bool>> {
        let providers: Vec<_> = self
            .read_providers()
            .iter()
            .map(|(name, provider)| (name.clone(), provider.clone()))
            .collect();

        providers
            .into_iter()
            .map(|(name, provider)| (name, provider.health_check()))
            .collect()
    }

    /// Close every registered adapter and drop the registrations. Individual
    /// adapters cannot block the rest from closing.
    pub fn close_all(&self) {
        let providers: Vec<Arc<Provider>> = {
            let mut guard = self.write_providers();
            guard.drain(..).map(|(_, provider)| provider).collect()
        };

        for provider in providers {
            provider.close();
        }

        log::debug!("all providers closed");
    }

    /// Remove all registrations, e.g. between independent configuration
    /// loads or test runs.
    pub fn clear(&self) {
        self.write_providers().clear();
        log::debug!("all providers cleared");
    }
}
