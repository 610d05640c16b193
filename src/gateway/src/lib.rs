//! Model Gateway - Prompt assembly and hosted model access
//!
//! The gateway flattens the conversation into a single prompt string and
//! sends it to a [`ModelProvider`]. Provider failures are values: callers turn
//! them into display text with [`describe_error`] instead of propagating them.
//!
//! No request timeout is configured. A stalled provider stalls the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Appended to the prompt when the user's input is not about basketball.
pub const OFF_TOPIC_NOTE: &str = "\nNOTE TO AI: Remember to only provide basketball-related information and recommendations. \
If the question is not about basketball, politely redirect the conversation to basketball topics.\n\n";

const MODEL_NOT_FOUND_MESSAGE: &str = "Error: The specified model is not available. \
Using the free Gemini model requires a valid API key and access. \
Please check your API key or try using a different model that's available with your access level.";

// ============ Prompt ============

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used inside the prompt
    pub fn prompt_label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// Concatenate system prompt, history and the new input into one prompt.
///
/// `off_topic` inserts [`OFF_TOPIC_NOTE`] ahead of the new input.
pub fn build_prompt<'a, I>(
    system_prompt: &str,
    history: I,
    user_input: &str,
    off_topic: bool,
) -> String
where
    I: IntoIterator<Item = (Role, &'a str)>,
{
    let mut prompt = format!("{}\n\n", system_prompt);
    for (role, content) in history {
        prompt.push_str(role.prompt_label());
        prompt.push_str(": ");
        prompt.push_str(content);
        prompt.push('\n');
    }
    if off_topic {
        prompt.push_str(OFF_TOPIC_NOTE);
    }
    prompt.push_str("User: ");
    prompt.push_str(user_input);
    prompt.push_str("\nAssistant: ");
    prompt
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
}

// ============ Errors ============

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("model not found: {model} ({detail})")]
    ModelNotFound { model: String, detail: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Model returned no text")]
    Empty,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Network(e.to_string())
    }
}

/// Display text for a failed generation
pub fn describe_error(error: &ProviderError) -> String {
    let message = error.to_string();
    if message.to_lowercase().contains("model not found") {
        MODEL_NOT_FOUND_MESSAGE.to_string()
    } else {
        format!(
            "Error: {}. Please check your API key and try again. \
If the problem persists, try using a different model version.",
            message
        )
    }
}

// ============ Provider ============

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}

// ============ Gemini ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: Vec<ContentBody<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct ContentBody<'a> {
    parts: Vec<PartBody<'a>>,
}

#[derive(Serialize)]
struct PartBody<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_API_BASE)
    }

    pub fn with_base_url(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, model)
    }
}

impl fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_base", &self.api_base)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::NoApiKey);
        }

        let body = GenerateContentBody {
            contents: vec![ContentBody {
                parts: vec![PartBody {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        };

        debug!(
            model = %request.model,
            prompt_chars = request.prompt.len(),
            "sending generateContent request"
        );
        let response = self
            .client
            .post(self.endpoint(&request.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            warn!(status = status.as_u16(), %message, "model provider returned an error");
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ProviderError::ModelNotFound {
                    model: request.model.clone(),
                    detail: message,
                });
            }
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::Parse(e.to_string()))?;

        let output: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if output.is_empty() {
            return Err(ProviderError::Empty);
        }
        debug!(response_chars = output.len(), "received model response");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            model: DEFAULT_MODEL.to_string(),
            prompt: prompt.to_string(),
            temperature: 0.5,
        }
    }

    #[test]
    fn test_prompt_includes_history_in_order() {
        let history = vec![
            (Role::User, "Who leads the league in assists?"),
            (Role::Assistant, "Tyrese Haliburton."),
        ];
        let prompt = build_prompt("SYSTEM", history, "And rebounds?", false);
        assert_eq!(
            prompt,
            "SYSTEM\n\nUser: Who leads the league in assists?\nAssistant: Tyrese Haliburton.\n\
User: And rebounds?\nAssistant: "
        );
    }

    #[test]
    fn test_prompt_adds_off_topic_note() {
        let prompt = build_prompt("SYSTEM", Vec::new(), "Best pizza in town?", true);
        assert!(prompt.starts_with("SYSTEM\n\n\nNOTE TO AI:"));
        assert!(prompt.ends_with("topics.\n\nUser: Best pizza in town?\nAssistant: "));
    }

    #[test]
    fn test_model_not_found_gets_special_message() {
        let error = ProviderError::ModelNotFound {
            model: "gemini-9".to_string(),
            detail: "gone".to_string(),
        };
        assert_eq!(describe_error(&error), MODEL_NOT_FOUND_MESSAGE);

        let api = ProviderError::Api {
            status: 400,
            message: "Model Not Found in region".to_string(),
        };
        assert_eq!(describe_error(&api), MODEL_NOT_FOUND_MESSAGE);
    }

    #[test]
    fn test_other_errors_are_wrapped() {
        let text = describe_error(&ProviderError::NoApiKey);
        assert!(text.starts_with("Error: API key not configured."));
        assert!(text.contains("check your API key"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let provider = GeminiProvider::with_base_url("  ", "http://127.0.0.1:9");
        let result = provider.generate(&request("hi")).await;
        assert!(matches!(result, Err(ProviderError::NoApiKey)));
    }

    #[tokio::test]
    async fn test_gemini_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{"parts": [{"text": "Explain pace"}]}],
                "generationConfig": {"temperature": 0.5}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Pace is "}, {"text": "possessions per 48."}]}
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GeminiProvider::with_base_url("test-key", server.uri());
        let text = provider.generate(&request("Explain pace")).await.unwrap();
        assert_eq!(text, "Pace is possessions per 48.");
    }

    #[tokio::test]
    async fn test_gemini_404_maps_to_model_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "code": 404,
                    "message": "models/gemini-1.5-flash is not found for API version v1beta",
                    "status": "NOT_FOUND"
                }
            })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::with_base_url("test-key", server.uri());
        let error = provider.generate(&request("hi")).await.unwrap_err();
        match &error {
            ProviderError::ModelNotFound { model, detail } => {
                assert_eq!(model, DEFAULT_MODEL);
                assert!(detail.contains("not found for API version"));
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
        assert_eq!(describe_error(&error), MODEL_NOT_FOUND_MESSAGE);
    }

    #[tokio::test]
    async fn test_gemini_api_error_and_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("key", "bad-key"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(query_param("key", "good-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .mount(&server)
            .await;

        let bad = GeminiProvider::with_base_url("bad-key", server.uri());
        match bad.generate(&request("hi")).await {
            Err(ProviderError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid");
            }
            other => panic!("expected Api error, got {other:?}"),
        }

        let good = GeminiProvider::with_base_url("good-key", server.uri());
        assert!(matches!(
            good.generate(&request("hi")).await,
            Err(ProviderError::Empty)
        ));
    }
}
