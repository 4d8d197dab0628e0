/// LLM Client: the single point of entry for every external AI call in Rehearse.
///
/// ARCHITECTURAL RULE: No other module may call the OpenAI API directly.
/// Chat, transcription, speech synthesis and realtime negotiation all go through here.
/// The interview core reaches this client through its own traits, never by name.
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// The model used for interviewer turns, evaluation and extraction.
pub const MODEL: &str = "gpt-4o";
pub const REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";
const TRANSCRIPTION_MODEL: &str = "whisper-1";
const SPEECH_MODEL: &str = "tts-1";
pub const DEFAULT_VOICE: &str = "nova";
const REALTIME_VOICE: &str = "ash";
const SPEECH_SPEED: f32 = 1.15;
const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;
const MAX_RETRIES: u32 = 3;
const TRANSCRIPTION_PROMPT: &str = "This is an interview response. Please include proper \
    punctuation, capitalization, and sentence structure.";
/// Returned when the model produces no content for an interviewer turn.
pub const FALLBACK_REPLY: &str = "I apologize, could you repeat that?";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Response is missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry of the history replayed to the chat endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if the model produced any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Short-lived credential plus session metadata for the realtime modality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSession {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub client_secret: Option<ClientSecret>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecret {
    pub value: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl RealtimeSession {
    /// The ephemeral secret, if the provider actually returned one.
    pub fn secret(&self) -> Option<&str> {
        self.client_secret
            .as_ref()
            .and_then(|s| s.value.as_deref())
            .filter(|v| !v.is_empty())
    }
}

/// The single AI client used by all services in Rehearse.
/// Wraps the OpenAI-compatible REST API with retry logic and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry_base_delay: Duration,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_base_delay: Duration::from_millis(1000),
        }
    }

    /// Shortens the backoff between retries (tests run against a local mock server).
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request built fresh for every attempt.
    /// Retries on 429 (rate limit), 5xx and transport errors with exponential backoff.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response, LlmError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1x, 2x the base delay
                let delay = self.retry_base_delay * (1 << (attempt - 1));
                warn!(
                    "AI call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("AI API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: extract_error_message(&body),
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: extract_error_message(&body),
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    async fn complete(
        &self,
        messages: Vec<&ChatMessage>,
        response_format: Option<serde_json::Value>,
    ) -> Result<ChatResponse, LlmError> {
        let request_body = ChatRequest {
            model: MODEL,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            response_format,
        };
        let url = self.url("/chat/completions");

        let response = self
            .send_with_retry(|| {
                self.client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&request_body)
            })
            .await?;

        let chat: ChatResponse = response.json().await?;
        if let Some(usage) = &chat.usage {
            debug!(
                "Chat call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(chat)
    }

    /// Sends the system instruction followed by the replayed history and
    /// returns the assistant's reply text.
    pub async fn chat(&self, system: &str, history: &[ChatMessage]) -> Result<String, LlmError> {
        let system_message = ChatMessage::new(ChatRole::System, system);
        let messages = std::iter::once(&system_message)
            .chain(history.iter())
            .collect();

        let response = self.complete(messages, None).await?;
        Ok(response
            .text()
            .map(str::to_string)
            .unwrap_or_else(|| FALLBACK_REPLY.to_string()))
    }

    /// Calls the model in JSON mode and deserializes the reply.
    /// The system prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<T, LlmError> {
        let system_message = ChatMessage::new(ChatRole::System, system);
        let user_message = ChatMessage::new(ChatRole::User, prompt);

        let response = self
            .complete(
                vec![&system_message, &user_message],
                Some(json!({ "type": "json_object" })),
            )
            .await?;

        let text = response.text().ok_or(LlmError::EmptyContent)?;

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(text);

        serde_json::from_str(text).map_err(LlmError::Parse)
    }

    /// Transcribes one recorded answer.
    pub async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String, LlmError> {
        let url = self.url("/audio/transcriptions");

        let response = self
            .send_with_retry(|| {
                let part = reqwest::multipart::Part::stream(audio.clone())
                    .file_name(file_name.to_string());
                let form = reqwest::multipart::Form::new()
                    .part("file", part)
                    .text("model", TRANSCRIPTION_MODEL)
                    .text("language", "en")
                    .text("response_format", "text")
                    .text("prompt", TRANSCRIPTION_PROMPT);
                self.client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .multipart(form)
            })
            .await?;

        let text = response.text().await?;
        debug!("Transcription succeeded, text length: {}", text.len());
        Ok(text.trim().to_string())
    }

    /// Synthesizes speech for one interviewer turn. Returns `audio/mpeg` bytes.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Bytes, LlmError> {
        let url = self.url("/audio/speech");
        let body = json!({
            "model": SPEECH_MODEL,
            "voice": voice.unwrap_or(DEFAULT_VOICE),
            "input": text,
            "speed": SPEECH_SPEED,
        });

        let response = self
            .send_with_retry(|| {
                self.client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            })
            .await?;

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(audio)
    }

    /// Requests an ephemeral credential for a realtime voice session.
    pub async fn create_realtime_session(
        &self,
        instructions: &str,
    ) -> Result<RealtimeSession, LlmError> {
        let url = self.url("/realtime/sessions");
        let body = json!({
            "model": REALTIME_MODEL,
            "voice": REALTIME_VOICE,
            "input_audio_transcription": { "model": TRANSCRIPTION_MODEL },
            "turn_detection": {
                "type": "server_vad",
                "threshold": 0.5,
                "prefix_padding_ms": 300,
                "silence_duration_ms": 1500,
            },
            "instructions": instructions,
        });

        let response = self
            .send_with_retry(|| {
                self.client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            })
            .await
            .map_err(describe_session_failure)?;

        Ok(response.json().await?)
    }

    /// Posts the local session description and returns the provider's answer.
    /// The descriptions are opaque to this client.
    pub async fn exchange_sdp(&self, secret: &str, offer_sdp: &str) -> Result<String, LlmError> {
        let url = self.url(&format!("/realtime?model={REALTIME_MODEL}"));

        let response = self
            .client
            .post(&url)
            .bearer_auth(secret)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }
        if body.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(body)
    }
}

/// Replaces provider messages for the two statuses users can act on.
fn describe_session_failure(err: LlmError) -> LlmError {
    match err {
        LlmError::Api { status: 401, .. } => LlmError::Api {
            status: 401,
            message: "Invalid OpenAI API key. Please check OPENAI_API_KEY.".to_string(),
        },
        LlmError::Api { status: 429, .. } => LlmError::Api {
            status: 429,
            message: "Rate limit exceeded. Please try again later.".to_string(),
        },
        other => other,
    }
}

/// Pulls `error.message` out of a provider error body, falling back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn test_client(base_url: &str) -> LlmClient {
        LlmClient::new("test-key".to_string(), base_url)
            .with_retry_base_delay(Duration::from_millis(5))
    }

    pub(crate) fn chat_body(text: &str) -> serde_json::Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 7 }
        })
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_extract_error_message_prefers_provider_message() {
        let body = r#"{"error": {"message": "bad key", "type": "auth"}}"#;
        assert_eq!(extract_error_message(body), "bad key");
        assert_eq!(extract_error_message("plain"), "plain");
    }

    #[test]
    fn test_realtime_session_secret_requires_value() {
        let without: RealtimeSession = serde_json::from_value(json!({ "id": "sess_1" })).unwrap();
        assert!(without.secret().is_none());

        let empty: RealtimeSession =
            serde_json::from_value(json!({ "client_secret": { "value": "" } })).unwrap();
        assert!(empty.secret().is_none());

        let with: RealtimeSession =
            serde_json::from_value(json!({ "client_secret": { "value": "ek_123" } })).unwrap();
        assert_eq!(with.secret(), Some("ek_123"));
    }

    #[tokio::test]
    async fn test_chat_prepends_system_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "system", "content": "be an interviewer" },
                    { "role": "user", "content": "hello" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Tell me about you.")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let reply = client
            .chat(
                "be an interviewer",
                &[ChatMessage::new(ChatRole::User, "hello")],
            )
            .await
            .unwrap();
        assert_eq!(reply, "Tell me about you.");
    }

    #[tokio::test]
    async fn test_chat_empty_content_uses_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": null } }]
            })))
            .mount(&server)
            .await;

        let reply = test_client(&server.uri()).chat("s", &[]).await.unwrap();
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_chat_retries_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("after retry")))
            .mount(&server)
            .await;

        let reply = test_client(&server.uri()).chat("s", &[]).await.unwrap();
        assert_eq!(reply, "after retry");
    }

    #[tokio::test]
    async fn test_chat_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "context too long" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri()).chat("s", &[]).await.unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "context too long");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_json_strips_fences() {
        #[derive(Deserialize)]
        struct Out {
            score: u32,
        }

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "response_format": { "type": "json_object" } })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_body("```json\n{\"score\": 72}\n```")),
            )
            .mount(&server)
            .await;

        let out: Out = test_client(&server.uri())
            .call_json("system", "prompt")
            .await
            .unwrap();
        assert_eq!(out.score, 72);
    }

    #[tokio::test]
    async fn test_synthesize_returns_audio_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(body_partial_json(json!({ "model": "tts-1", "voice": "nova" })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB, 0x90]))
            .mount(&server)
            .await;

        let audio = test_client(&server.uri())
            .synthesize("Hello there", None)
            .await
            .unwrap();
        assert_eq!(audio.as_ref(), &[0xFF, 0xFB, 0x90]);
    }

    #[tokio::test]
    async fn test_transcribe_trims_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  I led the migration.\n"))
            .mount(&server)
            .await;

        let text = test_client(&server.uri())
            .transcribe(Bytes::from_static(b"RIFF"), "recording.wav")
            .await
            .unwrap();
        assert_eq!(text, "I led the migration.");
    }

    #[tokio::test]
    async fn test_realtime_session_unauthorized_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/realtime/sessions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .create_realtime_session("instructions")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid OpenAI API key"));
    }

    #[tokio::test]
    async fn test_exchange_sdp_posts_offer_with_ephemeral_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/realtime"))
            .and(header("authorization", "Bearer ek_abc"))
            .and(header("content-type", "application/sdp"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v=0 answer"))
            .mount(&server)
            .await;

        let answer = test_client(&server.uri())
            .exchange_sdp("ek_abc", "v=0 offer")
            .await
            .unwrap();
        assert_eq!(answer, "v=0 answer");
    }
}
