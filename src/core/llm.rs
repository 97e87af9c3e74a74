use crate::config::Settings;
use crate::core::http_cache::{FetchRequest, ResponseCache};
use crate::storage::{ConversationTurn, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

pub const DISABLED_REPLY: &str = "My AI features are currently disabled by the bot owner.";
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I had a brain fart and couldn't think of a response. Try again?";

/// What to send to the model: turns oldest first plus the system prompt.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub turns: Vec<ConversationTurn>,
    pub system_prompt: String,
    pub structured: bool,
}

impl GenerationRequest {
    pub fn single(prompt: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ConversationTurn::user(prompt)],
            system_prompt: system_prompt.into(),
            structured: false,
        }
    }
}

/// JSON reply shape requested from the model in structured mode.
/// Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredReply {
    #[serde(default)]
    pub response_text: String,
    #[serde(default)]
    pub users_to_tag: Vec<String>,
    #[serde(default)]
    pub sentiment_change: Option<f64>,
    #[serde(default)]
    pub found_fact: bool,
    #[serde(default)]
    pub fact_text: Option<String>,
}

impl StructuredReply {
    /// Parses model output, tolerating a fenced code block around the JSON.
    /// Output that is not a JSON object becomes the reply text itself.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let unfenced = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .map(str::trim)
            .unwrap_or(trimmed);

        match serde_json::from_str::<StructuredReply>(unfenced) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("[LLMClient] Model did not return valid JSON ({}): {}", e, raw);
                Self {
                    response_text: trimmed.to_string(),
                    ..Self::default()
                }
            }
        }
    }

    pub fn fallback() -> Self {
        Self {
            response_text: FALLBACK_REPLY.to_string(),
            ..Self::default()
        }
    }
}

/// Seam between conversation logic and whichever model answers.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Raw model text, or `None` when nothing usable came back.
    async fn generate(&self, request: GenerationRequest) -> Option<String>;

    async fn generate_text(&self, request: GenerationRequest) -> String {
        self.generate(request)
            .await
            .unwrap_or_else(|| FALLBACK_REPLY.to_string())
    }

    async fn generate_structured(&self, mut request: GenerationRequest) -> StructuredReply {
        request.structured = true;
        match self.generate(request).await {
            Some(raw) => StructuredReply::parse(&raw),
            None => StructuredReply::fallback(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Part,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: SystemInstruction,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    cache: ResponseCache,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(cache: ResponseCache, api_key: Option<String>, settings: &Settings) -> Self {
        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not found. AI features will be disabled.");
        }
        Self {
            cache,
            api_key,
            endpoint: settings.ai.api_endpoint.clone(),
            model: settings.ai.model.clone(),
            temperature: settings.ai.temperature,
            max_output_tokens: settings.ai.max_output_tokens,
            timeout: settings.request_timeout(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }

    fn build_request(&self, request: GenerationRequest) -> GenerateRequest {
        let contents = request
            .turns
            .into_iter()
            .map(|turn| Content {
                role: match turn.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                },
                parts: vec![Part { text: turn.content }],
            })
            .collect();

        GenerateRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: Part {
                    text: request.system_prompt,
                },
            },
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_k: 1,
                top_p: 1.0,
                max_output_tokens: self.max_output_tokens,
                stop_sequences: Vec::new(),
                response_mime_type: request.structured.then_some("application/json"),
            },
        }
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Option<String> {
        let Some(api_key) = &self.api_key else {
            return Some(DISABLED_REPLY.to_string());
        };

        let body = match serde_json::to_value(self.build_request(request)) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("[LLMClient] Failed to encode request: {}", e);
                return None;
            }
        };

        let fetch = FetchRequest::post(self.url(), body)
            .with_header("x-goog-api-key", api_key.as_str())
            .with_timeout(self.timeout);

        let payload = self.cache.fetch(fetch).await?;
        let Some(value) = payload.into_json() else {
            tracing::warn!("[LLMClient] Non-JSON response from generateContent");
            return None;
        };

        let response: GenerateResponse = match serde_json::from_value(value) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("[LLMClient] Failed to decode response body: {}", e);
                return None;
            }
        };

        let text = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.trim().to_string())
            .filter(|t| !t.is_empty());

        if text.is_none() {
            tracing::warn!("[LLMClient] Response contained no candidate text");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, api_key: Option<&str>) -> GeminiClient {
        let settings = Settings::from_toml_str(&format!(
            "[ai]\napi_endpoint = \"{}/models/\"\nmodel = \"gemini-test\"",
            server.uri()
        ))
        .unwrap();
        GeminiClient::new(
            ResponseCache::new(Duration::from_secs(300)),
            api_key.map(String::from),
            &settings,
        )
    }

    fn candidate(text: &str) -> serde_json::Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    #[tokio::test]
    async fn test_generate_sends_turns_and_reads_text() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "k"))
            .and(body_partial_json(json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "hi"}]},
                    {"role": "model", "parts": [{"text": "what"}]}
                ],
                "systemInstruction": {"parts": {"text": "be rude"}},
                "generationConfig": {"topK": 1}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate("  go away  ")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client(&mock_server, Some("k"));
        let request = GenerationRequest {
            turns: vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("what"),
            ],
            system_prompt: "be rude".to_string(),
            structured: false,
        };

        assert_eq!(client.generate(request).await.as_deref(), Some("go away"));
    }

    #[tokio::test]
    async fn test_structured_mode_requests_json() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": {"responseMimeType": "application/json"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate(
                r#"{"response_text": "Ask David", "users_to_tag": ["David"], "sentiment_change": 0.5}"#,
            )))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client(&mock_server, Some("k"));
        let reply = client
            .generate_structured(GenerationRequest::single("who knows rust?", ""))
            .await;

        assert_eq!(reply.response_text, "Ask David");
        assert_eq!(reply.users_to_tag, vec!["David"]);
        assert_eq!(reply.sentiment_change, Some(0.5));
    }

    #[tokio::test]
    async fn test_server_error_falls_back() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = client(&mock_server, Some("k"));
        assert!(client
            .generate(GenerationRequest::single("hi", ""))
            .await
            .is_none());
        assert_eq!(
            client.generate_text(GenerationRequest::single("hi", "")).await,
            FALLBACK_REPLY
        );
        assert_eq!(
            client
                .generate_structured(GenerationRequest::single("hi", ""))
                .await,
            StructuredReply::fallback()
        );
    }

    #[tokio::test]
    async fn test_empty_candidates_is_none() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&mock_server)
            .await;

        let client = client(&mock_server, Some("k"));
        assert!(client
            .generate(GenerationRequest::single("hi", ""))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_missing_key_disables_without_network() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate("nope")))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = client(&mock_server, None);
        assert!(!client.is_enabled());
        assert_eq!(
            client.generate(GenerationRequest::single("hi", "")).await.as_deref(),
            Some(DISABLED_REPLY)
        );
    }

    #[test]
    fn test_structured_parse_variants() {
        let fenced = StructuredReply::parse("```json\n{\"response_text\": \"hi\"}\n```");
        assert_eq!(fenced.response_text, "hi");
        assert!(fenced.users_to_tag.is_empty());

        let fact = StructuredReply::parse(r#"{"found_fact": true, "fact_text": "Likes tea."}"#);
        assert!(fact.found_fact);
        assert_eq!(fact.fact_text.as_deref(), Some("Likes tea."));

        let plain = StructuredReply::parse("just words");
        assert_eq!(plain.response_text, "just words");
        assert!(!plain.found_fact);
    }
}
