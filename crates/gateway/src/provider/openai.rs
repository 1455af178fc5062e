//! Executor for vendors speaking the OpenAI chat-completions protocol.
//!
//! This covers both the `openai` and `deepseek` providers; DeepSeek exposes
//! the same wire format under a different endpoint.

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::{
    client::{ChatClient, ChunkStream, ClientCore, ModelSettings, ensure_has_messages},
    error::{GatewayError, Result},
    messages::{ChatChunk, Choice, CompletionRequest, CompletionResponse, Usage},
};

pub(crate) const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_DEEPSEEK_API_URL: &str = "https://api.deepseek.com/v1";

const DONE_MARKER: &str = "[DONE]";

pub(crate) struct OpenAiClient {
    core: ClientCore,
    chat_url: String,
}

impl OpenAiClient {
    pub(crate) fn new(settings: ModelSettings) -> Result<Self> {
        let chat_url = format!("{}/chat/completions", settings.base_url.trim_end_matches('/'));

        Ok(Self {
            core: ClientCore::new(settings)?,
            chat_url,
        })
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = sonic_rs::to_vec(request)
            .map_err(|e| GatewayError::api(format!("failed to serialize request: {e}")))?;

        let response = self
            .core
            .http
            .post(&self.chat_url)
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.core.settings.api_key.expose_secret()),
            )
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::api(format!("request failed: {e}")))?;

        let status = response.status();

        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::api(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(GatewayError::api_status(status.as_u16(), text));
        }

        let parsed: OpenAiChatResponse = sonic_rs::from_str(&text)
            .map_err(|e| GatewayError::api(format!("failed to parse response: {e}")))?;

        parsed.into_response()
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        ensure_has_messages(&request)?;

        let requested_model = request.model.clone();

        let mut request = request;
        request.model = self.core.settings.wire_model().to_string();
        request.stream = Some(false);

        let mut response = self.core.execute(|| self.send_once(&request)).await?;
        response.model = requested_model;

        Ok(response)
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        ensure_has_messages(&request)?;

        let requested_model = request.model.clone();

        let mut request = request;
        request.model = self.core.settings.wire_model().to_string();
        request.stream = Some(true);

        let body = sonic_rs::to_vec(&request)
            .map_err(|e| GatewayError::api(format!("failed to serialize request: {e}")))?;

        let response = self
            .core
            .http
            .post(&self.chat_url)
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.core.settings.api_key.expose_secret()),
            )
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::api(format!("stream request failed: {e}")))?;

        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::api_status(status.as_u16(), text));
        }

        let stream = decode_chunk_stream(response.bytes_stream()).map(move |chunk| {
            chunk.map(|mut chunk| {
                chunk.model = requested_model.clone();
                chunk
            })
        });

        Ok(Box::pin(stream))
    }

    fn settings(&self) -> &ModelSettings {
        &self.core.settings
    }

    fn is_available(&self) -> bool {
        self.core.is_available()
    }

    fn set_available(&self, available: bool) {
        self.core.set_available(available);
    }
}

/// Decode a newline-delimited SSE byte stream into completion chunks.
///
/// Blank frames are no-ops, the `[DONE]` sentinel ends iteration, and frames
/// that fail to parse are skipped so a single bad frame cannot kill an
/// otherwise healthy stream. Transport failures surface as `Api` errors.
pub(crate) fn decode_chunk_stream<S, B, E>(byte_stream: S) -> ChunkStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = byte_stream
        .eventsource()
        .take_while(|event| {
            let done = matches!(event, Ok(event) if event.data == DONE_MARKER);
            async move { !done }
        })
        .filter_map(|event| async move {
            match event {
                Ok(event) => {
                    if event.data.is_empty() {
                        return None;
                    }

                    match sonic_rs::from_str::<ChatChunk>(&event.data) {
                        Ok(chunk) => Some(Ok(chunk)),
                        Err(error) => {
                            log::warn!("skipping malformed stream frame: {error}");
                            None
                        }
                    }
                }
                Err(EventStreamError::Transport(error)) => {
                    Some(Err(GatewayError::api(format!("stream transport error: {error}"))))
                }
                Err(error) => {
                    log::warn!("skipping undecodable stream frame: {error}");
                    None
                }
            }
        });

    Box::pin(stream)
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    error: Option<OpenAiError>,
    #[serde(default)]
    id: String,
    #[serde(default)]
    object: String,
    #[serde(default)]
    created: u64,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    #[serde(default)]
    message: String,
}

impl OpenAiChatResponse {
    /// The gate every non-streaming response passes before it is returned:
    /// no top-level error object, and at least one choice.
    fn into_response(self) -> Result<CompletionResponse> {
        if let Some(error) = self.error {
            return Err(GatewayError::api(format!("API error: {}", error.message)));
        }

        if self.choices.is_empty() {
            return Err(GatewayError::api("invalid response: no choices found"));
        }

        Ok(CompletionResponse {
            id: self.id,
            object: self.object,
            created: self.created,
            model: self.model,
            choices: self.choices,
            usage: self.usage.unwrap_or_default(),
        })
    }
}
