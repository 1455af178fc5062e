//! Shared fixtures for the in-crate test suites: scripted executors and
//! settings builders, so registry and failover behavior can be exercised
//! without a network.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use secrecy::SecretString;

use crate::{
    client::{ChatClient, ChunkStream, ModelSettings},
    error::{GatewayError, Result},
    messages::{
        ChatChunk, ChatMessage, Choice, ChunkChoice, ChunkDelta, CompletionRequest, CompletionResponse, Role, Usage,
    },
};

pub(crate) fn settings(provider: &str, model: &str) -> ModelSettings {
    ModelSettings {
        model: model.to_string(),
        rename: None,
        provider: provider.to_string(),
        api_key: SecretString::from("test-key".to_string()),
        base_url: "http://127.0.0.1:0".to_string(),
        timeout: Duration::from_secs(5),
        max_retries: 3,
        max_concurrent_calls: 2,
    }
}

/// What a scripted executor does when called.
pub(crate) enum Behavior {
    /// Succeed with a single choice carrying this content.
    Succeed(String),
    /// Fail the way a real executor does after exhausting retries: mark
    /// itself unavailable and return an `Api` error.
    Fail(String),
}

pub(crate) struct ScriptedClient {
    settings: ModelSettings,
    behavior: Behavior,
    available: AtomicBool,
    pub(crate) calls: AtomicU32,
    pub(crate) last_request: Mutex<Option<CompletionRequest>>,
}

impl ScriptedClient {
    pub(crate) fn new(provider: &str, model: &str, behavior: Behavior) -> Self {
        Self {
            settings: settings(provider, model),
            behavior,
            available: AtomicBool::new(true),
            calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub(crate) fn unavailable(provider: &str, model: &str) -> Self {
        let client = Self::new(provider, model, Behavior::Fail("unavailable".into()));
        client.available.store(false, Ordering::Relaxed);
        client
    }

    pub(crate) fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, request: &CompletionRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
    }

    fn response(&self, content: &str, model: &str) -> CompletionResponse {
        CompletionResponse {
            id: "scripted-1".to_string(),
            object: "chat.completion".to_string(),
            created: 1_700_000_000,
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::assistant(content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        }
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.record(&request);

        match &self.behavior {
            Behavior::Succeed(content) => Ok(self.response(content, &request.model)),
            Behavior::Fail(reason) => {
                self.set_available(false);
                Err(GatewayError::api(format!(
                    "all 3 attempts failed for {}: {reason}",
                    self.settings.model
                )))
            }
        }
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        self.record(&request);

        match &self.behavior {
            Behavior::Succeed(content) => {
                let chunks = content
                    .chars()
                    .map(|c| {
                        Ok(ChatChunk {
                            id: "scripted-chunk".to_string(),
                            object: "chat.completion.chunk".to_string(),
                            created: 1_700_000_000,
                            model: request.model.clone(),
                            choices: vec![ChunkChoice {
                                delta: ChunkDelta {
                                    role: Some(Role::Assistant),
                                    content: Some(c.to_string()),
                                },
                                index: 0,
                                finish_reason: None,
                            }],
                        })
                    })
                    .collect::<Vec<_>>();

                Ok(Box::pin(stream::iter(chunks)))
            }
            Behavior::Fail(reason) => Err(GatewayError::api(format!(
                "stream failed for {}: {reason}",
                self.settings.model
            ))),
        }
    }

    fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }
}
