use async_trait::async_trait;
use review_core::config::{SamplingParams, Settings};
use review_core::response::RawResponse;
use review_core::AppError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ProviderError {
    /// The request never produced an HTTP response.
    #[error("Gemini API request failed: {0}")]
    Transport(String),

    /// Non-success status. `message` holds the provider's own wording.
    #[error("Gemini API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse Gemini response: {0}")]
    Decode(String),

    /// A response arrived but its candidate was withheld by content filtering.
    #[error("Candidate was blocked due to {0}")]
    CandidateBlocked(String),
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        AppError::ProviderError(e.to_string())
    }
}

/// Everything needed for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: String,
    pub sampling: SamplingParams,
    pub search_grounding: bool,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, ProviderError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    system_instruction: RequestContent,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GenerateContentRequest {
    fn from_request(request: &GenerationRequest) -> Self {
        let tools = if request.search_grounding {
            vec![Tool {
                google_search: serde_json::Map::new(),
            }]
        } else {
            Vec::new()
        };

        Self {
            contents: vec![RequestContent {
                role: Some("user".into()),
                parts: vec![RequestPart {
                    text: request.prompt.clone(),
                }],
            }],
            system_instruction: RequestContent {
                role: None,
                parts: vec![RequestPart {
                    text: request.system_instruction.clone(),
                }],
            },
            tools,
            generation_config: GenerationConfig {
                temperature: request.sampling.temperature,
                top_p: request.sampling.top_p,
                top_k: request.sampling.top_k,
                max_output_tokens: request.sampling.max_output_tokens,
            },
        }
    }
}

/// Gemini `generateContent` client. One plain request per call: no retry and
/// no timeout beyond the transport defaults.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl GeminiClient {
    pub fn new(settings: &Settings) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent("BookReviewGenerator/1.0")
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            api_base: settings.api_base.clone(),
            model: settings.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<RawResponse, ProviderError> {
        let body = GenerateContentRequest::from_request(request);

        debug!(
            model = %self.model,
            prompt_len = request.prompt.chars().count(),
            grounding = request.search_grounding,
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %text, "Gemini API error");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        response
            .json::<RawResponse>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// Provider error text for classification: the structured message and status
/// when the body has them, followed by the raw body so reason codes such as
/// `API_KEY_INVALID` stay visible.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(env) => {
            let status = env.error.status.unwrap_or_default();
            format!("{} [{}] {}", env.error.message, status, body)
        }
        Err(_) => body.to_string(),
    }
}
