use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, trace};

use crate::{
    conversation::{ConversationTurn, Part, Role},
    errors::AppError,
};

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
    HarmCategoryCivicIntegrity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
    Off,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
}

impl GenerationConfig {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub contents: Vec<ConversationTurn>,
    pub system_instruction: Option<String>,
    pub config: GenerationConfig,
    pub grounding: bool,
    pub safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub model_turn: ConversationTurn,
    pub finish_reason: Option<String>,
    pub candidate_count: usize,
    pub usage: Option<TokenUsage>,
    pub model: String,
    pub grounding_sources: Vec<String>,
}

/// Black-box access to the generative model provider.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AppError>;

    async fn count_tokens(&self, model: &str, contents: &[ConversationTurn]) -> Result<u64, AppError>;

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, AppError>;
}

/// Gemini REST client. `reqwest::Client` is an `Arc` internally, so clones are cheap.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|err| AppError::internal(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, model: &str, action: &str) -> String {
        format!(
            "{}/models/{}:{action}",
            self.api_base_url,
            model.trim_start_matches("models/")
        )
    }

    async fn post<B, R>(&self, model: &str, action: &str, body: &B) -> Result<R, AppError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let url = self.endpoint(model, action);
        debug!(model = %model, action = %action, "sending provider request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                error!(action = %action, error = %err, "provider request failed (transport)");
                AppError::provider(None, format!("{action} request failed: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(action = %action, status = status.as_u16(), "provider returned an error status");
            return Err(AppError::provider(
                Some(status.as_u16()),
                provider_error_message(status, &body),
            ));
        }

        let payload = response.json::<R>().await.map_err(|err| {
            error!(action = %action, error = %err, "failed to deserialize provider response");
            AppError::provider(None, format!("failed to parse {action} response: {err}"))
        })?;
        trace!(action = %action, "provider response received");
        Ok(payload)
    }
}

#[async_trait]
impl ModelProvider for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AppError> {
        let body = GenerateContentRequest::from_request(request);
        let response: GenerateContentResponse =
            self.post(&request.model, "generateContent", &body).await?;
        normalize_generation(response, &request.model)
    }

    async fn count_tokens(&self, model: &str, contents: &[ConversationTurn]) -> Result<u64, AppError> {
        let response: CountTokensResponse = self
            .post(model, "countTokens", &json!({ "contents": contents }))
            .await?;
        Ok(response.total_tokens)
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, AppError> {
        let body = json!({
            "content": { "parts": [Part::Text(text.to_string())] }
        });
        let response: EmbedContentResponse = self.post(model, "embedContent", &body).await?;
        Ok(response.embedding.values)
    }
}

// Private wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [ConversationTurn],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    safety_settings: Option<&'a [SafetySetting]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

impl<'a> GenerateContentRequest<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            contents: &request.contents,
            system_instruction: request
                .system_instruction
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(|text| SystemInstruction {
                    parts: vec![Part::Text(text.to_string())],
                }),
            generation_config: (!request.config.is_empty()).then_some(&request.config),
            safety_settings: (!request.safety_settings.is_empty())
                .then_some(request.safety_settings.as_slice()),
            tools: if request.grounding {
                vec![json!({ "googleSearch": {} })]
            } else {
                Vec::new()
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
    #[serde(default)]
    thoughts_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn normalize_generation(
    response: GenerateContentResponse,
    requested_model: &str,
) -> Result<GenerationResult, AppError> {
    let candidate_count = response.candidates.len();
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
            .map(|reason| format!("prompt blocked by provider: {reason}"))
            .unwrap_or_else(|| "provider returned no candidates".to_string());
        return Err(AppError::provider(None, reason));
    };

    // Reasoning parts are not part of the visible answer.
    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| part.thought != Some(true))
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    let grounding_sources = candidate
        .grounding_metadata
        .map(|metadata| {
            metadata
                .grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web.and_then(|web| web.uri))
                .collect()
        })
        .unwrap_or_default();

    let usage = response.usage_metadata.map(|usage| TokenUsage {
        prompt_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
        reasoning_tokens: usage.thoughts_token_count,
    });

    Ok(GenerationResult {
        model_turn: ConversationTurn {
            role: Role::Model,
            parts: vec![Part::Text(text.clone())],
        },
        text,
        finish_reason: candidate.finish_reason,
        candidate_count,
        usage,
        model: response
            .model_version
            .unwrap_or_else(|| requested_model.to_string()),
        grounding_sources,
    })
}

fn provider_error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ProviderErrorBody>(body) {
        Ok(parsed) if !parsed.error.message.is_empty() => match parsed.error.status {
            Some(code) => format!("{} ({code})", parsed.error.message),
            None => parsed.error.message,
        },
        _ => {
            let snippet: String = body.trim().chars().take(200).collect();
            if snippet.is_empty() {
                format!("provider returned HTTP {status}")
            } else {
                format!("provider returned HTTP {status}: {snippet}")
            }
        }
    }
}
