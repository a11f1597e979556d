//! Google Gemini provider.
//!
//! Talks to the `generateContent` endpoint of the Generative Language API.
//! The API key travels in the `x-goog-api-key` header so that transport
//! errors, which echo the request URL, never carry it.

use super::{ChatRequest, ChatResponse, Provider, ProviderError, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use resume_common::config::LlmConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "gemini";

/// Gemini provider.
pub struct GeminiProvider {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<i64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<i64>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<i64>,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    ///
    /// A missing key is accepted here; every call then fails with a
    /// descriptive [`ProviderError`].
    pub fn new(api_key: Option<&str>, config: &LlmConfig) -> resume_common::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                resume_common::Error::Config(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Whether a credential is available.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, model: &str) -> String {
        let model_name = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{model_name}:generateContent", self.base_url)
    }

    fn error(model: &str, message: impl Into<String>) -> ProviderError {
        ProviderError::new(PROVIDER_NAME, model, message)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn models(&self) -> Vec<&str> {
        vec![
            "gemini-2.0-flash",
            "gemini-1.5-pro",
            "gemini-1.5-flash",
            "gemini-1.5-flash-8b",
        ]
    }

    fn supports_model(&self, model: &str) -> bool {
        model.starts_with("gemini-") || model.starts_with("models/gemini-")
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();

        let api_key = self.api_key.as_ref().ok_or_else(|| {
            Self::error(
                &request.model,
                "Gemini API key not found. Set GEMINI_API_KEY in the environment or secrets.gemini_api_key in the config file.",
            )
        })?;

        let contents: Vec<Content> = request
            .messages
            .iter()
            .map(|msg| Content {
                role: match msg.role.as_str() {
                    "assistant" => "model".to_string(),
                    other => other.to_string(),
                },
                parts: vec![Part {
                    text: msg.content.clone(),
                }],
            })
            .collect();

        let gemini_request = GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(0.7),
                max_output_tokens: request.max_tokens.unwrap_or(8192),
            },
        };

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", api_key)
            .json(&gemini_request)
            .send()
            .await
            .map_err(|e| Self::error(&request.model, format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::error(
                &request.model,
                format!("API error ({}): {}", status.as_u16(), error_text),
            )
            .with_status(status.as_u16()));
        }

        let result: GenerateContentResponse = response.json().await.map_err(|e| {
            Self::error(&request.model, format!("Failed to parse response: {e}"))
        })?;

        if let Some(err) = result.error {
            return Err(Self::error(
                &request.model,
                format!("API error: {}", err.message),
            ));
        }

        let Some(candidate) = result.candidates.and_then(|c| c.into_iter().next()) else {
            let reason = result
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map_or_else(
                    || "No response from Gemini".to_string(),
                    |r| format!("Prompt blocked: {r}"),
                );
            return Err(Self::error(&request.model, reason));
        };

        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if content.is_empty() {
            if let Some(reason) = candidate
                .finish_reason
                .as_deref()
                .filter(|r| *r != "STOP")
            {
                return Err(Self::error(
                    &request.model,
                    format!("Response contained no text (finish reason: {reason})"),
                ));
            }
        }

        let usage = result
            .usage_metadata
            .map_or(TokenUsage::default(), |u| TokenUsage {
                input_tokens: u.prompt_token_count.unwrap_or(0),
                output_tokens: u.candidates_token_count.unwrap_or(0),
                total_tokens: u.total_token_count.unwrap_or(0),
            });

        Ok(ChatResponse {
            provider: PROVIDER_NAME.into(),
            model: request.model,
            content,
            usage,
            finish_reason: candidate.finish_reason,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: server.uri(),
            ..LlmConfig::default()
        }
    }

    fn request(messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: "gemini-1.5-flash".into(),
            messages,
            max_tokens: Some(256),
            temperature: Some(0.2),
        }
    }

    #[test]
    fn provider_creates_with_key() {
        let provider = GeminiProvider::new(Some("test-api-key"), &LlmConfig::default()).unwrap();
        assert!(provider.has_api_key());
        assert_eq!(provider.api_key.as_deref(), Some("test-api-key"));
    }

    #[test]
    fn blank_key_is_treated_as_missing() {
        let provider = GeminiProvider::new(Some("  "), &LlmConfig::default()).unwrap();
        assert!(!provider.has_api_key());
    }

    #[test]
    fn supports_gemini_models() {
        let provider = GeminiProvider::new(Some("key"), &LlmConfig::default()).unwrap();
        assert!(provider.supports_model("gemini-2.0-flash"));
        assert!(provider.supports_model("models/gemini-1.5-pro"));
        assert!(!provider.supports_model("gpt-4"));
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn endpoint_prefixes_models_path() {
        let provider = GeminiProvider::new(Some("key"), &LlmConfig::default()).unwrap();
        assert_eq!(
            provider.endpoint("gemini-1.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert!(provider
            .endpoint("models/gemini-1.5-flash")
            .ends_with("/models/gemini-1.5-flash:generateContent"));
    }

    #[tokio::test]
    async fn missing_key_fails_at_call_time() {
        let provider = GeminiProvider::new(None, &LlmConfig::default()).unwrap();
        let err = provider
            .chat(request(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(err.message.contains("API key not found"));
        assert!(err.status_code.is_none());
    }

    #[tokio::test]
    async fn sends_history_and_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-1.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "Hi" }] },
                    { "role": "model", "parts": [{ "text": "Hello!" }] },
                    { "role": "user", "parts": [{ "text": "Summarize my resume" }] }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "You are " }, { "text": "a Rust engineer." }] },
                    "finishReason": "STOP"
                }],
                "usageMetadata": {
                    "promptTokenCount": 12,
                    "candidatesTokenCount": 6,
                    "totalTokenCount": 18
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(Some("test-key"), &config_for(&server)).unwrap();
        let response = provider
            .chat(request(vec![
                Message::user("Hi"),
                Message::assistant("Hello!"),
                Message::user("Summarize my resume"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.content, "You are a Rust engineer.");
        assert_eq!(response.usage.total_tokens, 18);
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
    }

    #[tokio::test]
    async fn request_body_carries_only_contents_and_generation_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "ok" }] },
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(Some("test-key"), &config_for(&server)).unwrap();
        provider
            .chat(request(vec![Message::user("Hi")]))
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = received[0].body_json().unwrap();
        let mut keys: Vec<_> = body.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["contents", "generationConfig"]);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
    }

    #[tokio::test]
    async fn http_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exhausted"))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(Some("test-key"), &config_for(&server)).unwrap();
        let err = provider
            .chat(request(vec![Message::user("hi")]))
            .await
            .unwrap_err();

        assert_eq!(err.status_code, Some(429));
        assert!(err.message.contains("quota exhausted"));
        assert!(!err.to_string().contains("test-key"));
    }

    #[tokio::test]
    async fn blocked_prompt_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(Some("test-key"), &config_for(&server)).unwrap();
        let err = provider
            .chat(request(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(err.message.contains("Prompt blocked: SAFETY"));
    }

    #[tokio::test]
    async fn empty_candidate_with_abnormal_finish_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "finishReason": "SAFETY" }]
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(Some("test-key"), &config_for(&server)).unwrap();
        let err = provider
            .chat(request(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(err.message.contains("finish reason: SAFETY"));
    }
}
