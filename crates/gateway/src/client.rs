//! The executor seam: one [`ChatClient`] per vendor/model pair.

use std::{
    pin::Pin,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use futures::Stream;
use reqwest::{
    Client,
    header::{CONNECTION, HeaderMap, HeaderValue},
};
use secrecy::SecretString;

use crate::{
    error::{GatewayError, Result},
    messages::{ChatChunk, CompletionRequest, CompletionResponse},
    retry::RetryPolicy,
};

/// Stream of normalized completion chunks. Finite and not restartable: it is
/// terminated either by a chunk carrying a `finish_reason` or by the
/// transport's end-of-stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// Resolved runtime settings for one vendor/model pair, produced from
/// configuration at provider construction time and immutable afterwards.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Routable model name (the configuration key).
    pub model: String,
    /// Optional vendor-side model name; `model` is used on the wire when
    /// absent.
    pub rename: Option<String>,
    /// Name of the owning provider.
    pub provider: String,
    pub api_key: SecretString,
    pub base_url: String,
    /// Bound on every outbound call; a timeout is an ordinary transport
    /// failure consumed by the retry loop.
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_concurrent_calls: usize,
}

impl ModelSettings {
    /// The model name sent to the vendor.
    pub fn wire_model(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.model)
    }
}

/// Capability interface of a model executor: one logical completion call, or
/// one streaming call, against a single vendor/model pair.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Execute one completion call, including retries. Exhausting the retry
    /// budget marks the executor unavailable and yields an `Api` error
    /// wrapping the last underlying failure.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Open a streaming completion. Streams are never retried internally;
    /// establishment and transport failures surface as `Api` errors, while
    /// malformed individual frames are skipped.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream>;

    fn settings(&self) -> &ModelSettings;

    fn is_available(&self) -> bool;

    fn set_available(&self, available: bool);

    fn model(&self) -> &str {
        &self.settings().model
    }

    fn provider(&self) -> &str {
        &self.settings().provider
    }
}

impl std::fmt::Debug for dyn ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("provider", &self.provider())
            .field("model", &self.model())
            .field("available", &self.is_available())
            .finish()
    }
}

/// Shared state of the concrete executors: transport, availability flag and
/// retry policy.
pub(crate) struct ClientCore {
    pub(crate) settings: ModelSettings,
    pub(crate) http: Client,
    available: AtomicBool,
    retry: RetryPolicy,
}

impl ClientCore {
    pub(crate) fn new(settings: ModelSettings) -> Result<Self> {
        let http = default_http_client_builder(&settings).build().map_err(|e| {
            GatewayError::api(format!(
                "failed to build HTTP client for model {}: {e}",
                settings.model
            ))
        })?;

        let retry = RetryPolicy::new(settings.max_retries);

        Ok(Self {
            settings,
            http,
            available: AtomicBool::new(true),
            retry,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one logical call through the retry loop. Exhaustion flips the
    /// availability flag before the terminal error is returned.
    pub(crate) async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.retry.run(&self.settings.model, operation).await {
            Ok(value) => Ok(value),
            Err(error) => {
                self.set_available(false);
                Err(error)
            }
        }
    }

    // The flag is written by at most the executor itself and read by the
    // provider and the failover chain; a stale read costs one extra failed
    // attempt, so relaxed ordering is enough.
    pub(crate) fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }
}

/// A vendor must never see a request without messages.
pub(crate) fn ensure_has_messages(request: &CompletionRequest) -> Result<()> {
    if request.messages.is_empty() {
        return Err(GatewayError::api("request has no messages"));
    }

    Ok(())
}

pub(crate) fn default_http_client_builder(settings: &ModelSettings) -> reqwest::ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    Client::builder()
        .timeout(settings.timeout)
        // Short idle timeout so DNS changes are picked up even under
        // sustained traffic; same default as the larger gateways.
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .pool_max_idle_per_host(settings.max_concurrent_calls)
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
}
