//! Executor for the Google Gemini `generateContent` API.
//!
//! Gemini does not speak the chat-completions protocol: the non-streaming
//! call returns one bulk result and the streaming call yields text pieces.
//! Both are normalized here — a single synthesized choice with zeroed usage
//! for `complete`, and one chunk per text piece with no finish reason for
//! `complete_stream`.

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    client::{ChatClient, ChunkStream, ClientCore, ModelSettings, ensure_has_messages},
    error::{GatewayError, Result},
    messages::{
        ChatChunk, ChatMessage, Choice, ChunkChoice, ChunkDelta, CompletionRequest, CompletionResponse, Role, Usage,
    },
};

pub(crate) const DEFAULT_GOOGLE_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub(crate) struct GoogleClient {
    core: ClientCore,
}

impl GoogleClient {
    pub(crate) fn new(settings: ModelSettings) -> Result<Self> {
        Ok(Self {
            core: ClientCore::new(settings)?,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{method}?key={}",
            self.core.settings.base_url.trim_end_matches('/'),
            self.core.settings.wire_model(),
            self.core.settings.api_key.expose_secret()
        )
    }

    async fn send_once(&self, url: &str, request: &GenerateContentRequest, model: &str) -> Result<CompletionResponse> {
        let body = sonic_rs::to_vec(request)
            .map_err(|e| GatewayError::api(format!("failed to serialize request: {e}")))?;

        let response = self
            .core
            .http
            .post(url)
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

        let parsed: GenerateContentResponse = sonic_rs::from_str(&text)
            .map_err(|e| GatewayError::api(format!("failed to parse response: {e}")))?;

        parsed.into_response(model)
    }
}

#[async_trait]
impl ChatClient for GoogleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        ensure_has_messages(&request)?;

        let url = self.endpoint("generateContent");
        let requested_model = request.model.clone();
        let google_request = GenerateContentRequest::from_completion(&request);

        self.core
            .execute(|| self.send_once(&url, &google_request, &requested_model))
            .await
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        ensure_has_messages(&request)?;

        let url = self.endpoint("streamGenerateContent") + "&alt=sse";
        let requested_model = request.model.clone();
        let google_request = GenerateContentRequest::from_completion(&request);

        let body = sonic_rs::to_vec(&google_request)
            .map_err(|e| GatewayError::api(format!("failed to serialize request: {e}")))?;

        let response = self
            .core
            .http
            .post(&url)
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

        Ok(decode_piece_stream(response.bytes_stream(), requested_model))
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

/// Decode Gemini's SSE frames into chunks: one chunk per text piece, no
/// finish reason, until the vendor closes the stream. There is no sentinel
/// frame; malformed or textless frames are skipped.
fn decode_piece_stream<S, B, E>(byte_stream: S, model: String) -> ChunkStream
where
    S: futures::Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = byte_stream.eventsource().filter_map(move |event| {
        let model = model.clone();

        async move {
            match event {
                Ok(event) => {
                    if event.data.is_empty() {
                        return None;
                    }

                    let piece: GenerateContentResponse = match sonic_rs::from_str(&event.data) {
                        Ok(piece) => piece,
                        Err(error) => {
                            log::warn!("skipping malformed stream frame: {error}");
                            return None;
                        }
                    };

                    let text = piece.text();

                    if text.is_empty() {
                        return None;
                    }

                    Some(Ok(ChatChunk {
                        id: format!("genai-stream-{}", Uuid::new_v4()),
                        object: "chat.completion.chunk".to_string(),
                        created: unix_timestamp(),
                        model,
                        choices: vec![ChunkChoice {
                            delta: ChunkDelta {
                                role: Some(Role::Assistant),
                                content: Some(text),
                            },
                            index: 0,
                            finish_reason: None,
                        }],
                    }))
                }
                Err(EventStreamError::Transport(error)) => {
                    Some(Err(GatewayError::api(format!("stream transport error: {error}"))))
                }
                Err(error) => {
                    log::warn!("skipping undecodable stream frame: {error}");
                    None
                }
            }
        }
    });

    Box::pin(stream)
}

fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

impl GenerateContentRequest {
    fn from_completion(request: &CompletionRequest) -> Self {
        let mut contents = Vec::new();
        let mut system_parts = Vec::new();

        for message in &request.messages {
            match message.role {
                Role::System => system_parts.push(Part::text(&message.content)),
                // Function results have no dedicated slot; they go in as
                // user turns.
                Role::User | Role::Function => contents.push(Content::user(&message.content)),
                Role::Assistant => contents.push(Content::model(&message.content)),
            }
        }

        let system_instruction = if system_parts.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: system_parts,
            })
        };

        let generation_config = GenerationConfig::from_completion(request);

        Self {
            contents,
            generation_config,
            system_instruction,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        }
    }

    fn model(text: &str) -> Self {
        Self {
            role: Some("model".to_string()),
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

impl GenerationConfig {
    fn from_completion(request: &CompletionRequest) -> Option<Self> {
        if request.stop.is_none()
            && request.max_tokens.is_none()
            && request.temperature.is_none()
            && request.top_p.is_none()
        {
            return None;
        }

        Some(Self {
            stop_sequences: request.stop.clone(),
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Synthesize the canonical response: one assistant choice wrapping the
    /// whole text, usage zeroed (the vendor reports no token counts here).
    fn into_response(self, model: &str) -> Result<CompletionResponse> {
        let text = self.text();

        if text.is_empty() {
            return Err(GatewayError::api("invalid response: no candidates with text"));
        }

        Ok(CompletionResponse {
            id: format!("genai-{}", Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: unix_timestamp(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage::assistant(text),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures::{StreamExt, stream};

    use super::*;

    #[test]
    fn system_messages_become_system_instruction() {
        let request = CompletionRequest::new(
            "gemini-2-5-flash",
            vec![
                ChatMessage::system("Be terse."),
                ChatMessage::user("Hi"),
                ChatMessage::assistant("Hello!"),
                ChatMessage::user("Bye"),
            ],
        );

        let google_request = GenerateContentRequest::from_completion(&request);

        let system = google_request.system_instruction.unwrap();
        assert_eq!(system.parts[0].text.as_deref(), Some("Be terse."));

        let roles: Vec<_> = google_request
            .contents
            .iter()
            .map(|content| content.role.as_deref().unwrap())
            .collect();
        assert_eq!(roles, ["user", "model", "user"]);
    }

    #[test]
    fn sampling_parameters_are_omitted_when_absent() {
        let request = CompletionRequest::new("gemini-2-5-flash", vec![ChatMessage::user("Hi")]);
        let google_request = GenerateContentRequest::from_completion(&request);

        let json = sonic_rs::to_string(&google_request).unwrap();

        assert!(google_request.generation_config.is_none());
        assert!(!json.contains("generationConfig"));
        assert!(!json.contains("systemInstruction"));
    }

    #[test]
    fn sampling_parameters_map_to_generation_config() {
        let mut request = CompletionRequest::new("gemini-2-5-flash", vec![ChatMessage::user("Hi")]);
        request.max_tokens = Some(256);
        request.temperature = Some(0.2);

        let google_request = GenerateContentRequest::from_completion(&request);
        let json = sonic_rs::to_string(&google_request).unwrap();

        assert!(json.contains(r#""maxOutputTokens":256"#));
        assert!(!json.contains("topP"));
    }

    #[test]
    fn bulk_response_synthesizes_single_choice_with_zeroed_usage() {
        let parsed: GenerateContentResponse = sonic_rs::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"The "},{"text":"answer."}]}}]}"#,
        )
        .unwrap();

        let response = parsed.into_response("gemini-2-5-flash").unwrap();

        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].message.content, "The answer.");
        assert_eq!(response.choices[0].message.role, Role::Assistant);
        assert_eq!(response.choices[0].finish_reason, "stop");
        assert_eq!(response.usage, Usage::default());
        assert_eq!(response.model, "gemini-2-5-flash");
        assert!(response.id.starts_with("genai-"));
    }

    #[test]
    fn empty_candidates_are_rejected() {
        let parsed: GenerateContentResponse = sonic_rs::from_str(r#"{"candidates":[]}"#).unwrap();

        let error = parsed.into_response("gemini-2-5-flash").unwrap_err();

        assert!(error.to_string().contains("no candidates"));
    }

    #[tokio::test]
    async fn stream_yields_one_chunk_per_text_piece() {
        let frames = [
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Once\"}]}}]}\n\n",
            "data: {broken\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\" upon\"}]}}]}\n\n",
        ];
        let byte_stream = stream::iter(
            frames
                .iter()
                .map(|f| Ok::<_, Infallible>(f.as_bytes().to_vec()))
                .collect::<Vec<_>>(),
        );

        let chunks: Vec<_> = decode_piece_stream(byte_stream, "gemini-2-5-flash".to_string())
            .collect()
            .await;

        assert_eq!(chunks.len(), 2);

        for chunk in &chunks {
            let chunk = chunk.as_ref().unwrap();
            assert_eq!(chunk.model, "gemini-2-5-flash");
            assert_eq!(chunk.choices[0].finish_reason, None);
            assert_eq!(chunk.choices[0].delta.role, Some(Role::Assistant));
        }
    }
}
