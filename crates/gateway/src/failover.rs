//! Ordered failover across candidate models.
//!
//! Candidate order encodes priority: the primary model first, fallbacks
//! after. Candidates are tried strictly in order and never concurrently; the
//! first usable response wins. Partial failures stay invisible to the caller
//! — either one candidate succeeds, or a single terminal error embedding the
//! last underlying failure comes back.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    client::ChunkStream,
    error::{GatewayError, Result},
    messages::{ChatMessage, CompletionRequest},
    registry::Registry,
};

pub struct Failover {
    registry: Arc<Registry>,
    candidates: Vec<String>,
}

impl Failover {
    pub fn new(registry: Arc<Registry>, candidates: Vec<String>) -> Self {
        Self { registry, candidates }
    }

    /// Candidate list defaulted to every model the registry currently
    /// serves, in vendor order.
    pub fn from_registry_models(registry: Arc<Registry>) -> Self {
        let candidates = registry.all_models().into_values().flatten().collect();

        Self { registry, candidates }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Produce one final text response by trying candidates in order.
    pub async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let mut last_error = None;

        for model_name in &self.candidates {
            let client = match self.registry.client_by_model(model_name) {
                Ok(client) => client,
                Err(error) => {
                    // Lookup failures are not fatal for the chain; the next
                    // candidate may resolve.
                    log::warn!("model {model_name} could not be resolved: {error}");
                    continue;
                }
            };

            if !client.is_available() {
                log::warn!("model {model_name} is not available, skipping");
                continue;
            }

            log::debug!("attempting to generate response using {model_name}");

            let request = CompletionRequest::new(model_name.clone(), messages.clone());

            match client.complete(request).await {
                Ok(response) => {
                    if let Some(choice) = response.choices.into_iter().next() {
                        log::debug!("generated response using {model_name}");
                        return Ok(choice.message.content);
                    }

                    log::warn!("model {model_name} returned no choices");
                }
                Err(error) => {
                    log::warn!("failed to generate response using {model_name}: {error}");
                    last_error = Some(error);
                }
            }
        }

        Err(GatewayError::AllCandidatesFailed {
            last: last_error.map(Box::new),
        })
    }

    /// Open a chunk stream from the first candidate that accepts the call.
    ///
    /// Failover applies at stream establishment only; once a stream is
    /// handed out, mid-stream failures belong to the caller (streams are not
    /// retried).
    pub async fn generate_stream(&self, messages: Vec<ChatMessage>) -> Result<ChunkStream> {
        let mut last_error = None;

        for model_name in &self.candidates {
            let client = match self.registry.client_by_model(model_name) {
                Ok(client) => client,
                Err(error) => {
                    log::warn!("model {model_name} could not be resolved: {error}");
                    continue;
                }
            };

            if !client.is_available() {
                log::warn!("model {model_name} is not available, skipping");
                continue;
            }

            log::debug!("attempting to open stream using {model_name}");

            let request = CompletionRequest::new(model_name.clone(), messages.clone());

            match client.complete_stream(request).await {
                Ok(stream) => {
                    log::debug!("opened stream using {model_name}");
                    return Ok(stream);
                }
                Err(error) => {
                    log::warn!("failed to open stream using {model_name}: {error}");
                    last_error = Some(error);
                }
            }
        }

        Err(GatewayError::AllCandidatesFailed {
            last: last_error.map(Box::new),
        })
    }

    /// Short extractive summary through the same failover path: a fixed
    /// two-message request whose user content is bounded by `max_chars`.
    pub async fn summarize(&self, title: &str, body: &str, max_chars: usize) -> Result<String> {
        let system = format!(
            "You are a keyword extraction expert, skilled at distilling article key points. \
             Please keep the summary within {max_chars} characters."
        );

        let excerpt: String = body.chars().take(max_chars).collect();
        let user = format!(
            "Summarize the article in one sentence within {max_chars} characters. \
             Extract only facts and data, remove redundant words.\n\n\
             Article Title: {title}\nContent: {excerpt}"
        );

        self.generate(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .await
    }

    /// Candidates that are currently resolvable and available. Introspection
    /// only; routing always walks the full candidate list.
    pub fn available_models(&self) -> Vec<String> {
        self.candidates
            .iter()
            .filter(|model| {
                self.registry
                    .client_by_model(model)
                    .map(|client| client.is_available())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Health of every model behind this chain's registry.
    pub fn health_check(&self) -> BTreeMap<String, BTreeMap<String, bool>> {
        self.registry.health_check_all()
    }
}
