//! Tools exposed via Model Context Protocol
//!
//! The catalog is plain data: every tool is a name, description, input schema
//! and capability tags. `tools/call` looks the tool up, runs the schema
//! validation stage, then hands typed arguments to the matching handler.

use chrono::{SecondsFormat, Utc};
use rust_mcp_sdk::schema::{
    CallToolRequestParams, CallToolResult, ContentBlock, TextContent, Tool,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::{
    conversation::{ConversationTurn, Part},
    domain::{
        models::{filter_models, find_model, ModelCapabilities, ModelFilter, MODEL_CATALOG},
        schema::{InputSchema, Property, SchemaType, ValidationError},
        utils::{normalize_optional, parse_inline_image},
    },
    errors::AppError,
    gemini_client::{GenerationConfig, GenerationRequest, GenerationResult, SafetySetting},
    AppState,
};

pub const GENERATE_TOOL: &str = "generate";
pub const VISION_ANALYZE_TOOL: &str = "vision-analyze";
pub const TOKEN_COUNT_TOOL: &str = "token-count";
pub const LIST_MODELS_TOOL: &str = "list-models";
pub const EMBED_TOOL: &str = "embed";

const IMAGE_SOURCES: &[&str] = &["imageRef", "imageData"];

const U32_MAX: f64 = 4_294_967_295.0;

static SAFETY_THRESHOLD_SCHEMA: InputSchema = InputSchema {
    properties: &[
        Property::new("category", SchemaType::String, "Harm category").one_of(&[
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
            "HARM_CATEGORY_CIVIC_INTEGRITY",
        ]),
        Property::new("threshold", SchemaType::String, "Blocking threshold").one_of(&[
            "BLOCK_NONE",
            "BLOCK_ONLY_HIGH",
            "BLOCK_MEDIUM_AND_ABOVE",
            "BLOCK_LOW_AND_ABOVE",
            "OFF",
        ]),
    ],
    required: &["category", "threshold"],
    exactly_one_of: &[],
};

static GENERATE_SCHEMA: InputSchema = InputSchema {
    properties: &[
        Property::new("prompt", SchemaType::String, "Text prompt to send to the model"),
        Property::new("model", SchemaType::String, "Model id, defaults to the server default"),
        Property::new(
            "systemInstruction",
            SchemaType::String,
            "System instruction guiding the model's behavior",
        ),
        Property::new("temperature", SchemaType::Number, "Sampling temperature")
            .range(Some(0.0), Some(2.0)),
        Property::new("maxTokens", SchemaType::Integer, "Maximum output tokens")
            .range(Some(1.0), Some(U32_MAX)),
        Property::new("topK", SchemaType::Integer, "Top-k sampling")
            .range(Some(1.0), Some(U32_MAX)),
        Property::new("topP", SchemaType::Number, "Nucleus sampling").range(Some(0.0), Some(1.0)),
        Property::new(
            "structuredOutput",
            SchemaType::Boolean,
            "Request a JSON response",
        ),
        Property::new(
            "outputSchema",
            SchemaType::Object,
            "JSON schema for the structured response",
        ),
        Property::new(
            "grounding",
            SchemaType::Boolean,
            "Ground the answer with search results",
        ),
        Property::new(
            "safetyThresholds",
            SchemaType::ArrayOf(&SAFETY_THRESHOLD_SCHEMA),
            "Content safety thresholds",
        ),
        Property::new(
            "sessionId",
            SchemaType::String,
            "Conversation id whose history is sent along and extended",
        ),
    ],
    required: &["prompt"],
    exactly_one_of: &[],
};

static VISION_ANALYZE_SCHEMA: InputSchema = InputSchema {
    properties: &[
        Property::new("prompt", SchemaType::String, "Question or instruction about the image"),
        Property::new("imageRef", SchemaType::String, "Remote image URL"),
        Property::new(
            "imageData",
            SchemaType::String,
            "Base64 image data, optionally as data:<mimeType>;base64,<payload>",
        ),
        Property::new("model", SchemaType::String, "Vision-capable model id"),
    ],
    required: &["prompt"],
    exactly_one_of: &[IMAGE_SOURCES],
};

static TOKEN_COUNT_SCHEMA: InputSchema = InputSchema {
    properties: &[
        Property::new("text", SchemaType::String, "Text to count tokens for"),
        Property::new("model", SchemaType::String, "Model whose tokenizer is used"),
    ],
    required: &["text"],
    exactly_one_of: &[],
};

static LIST_MODELS_SCHEMA: InputSchema = InputSchema {
    properties: &[Property::new(
        "filter",
        SchemaType::String,
        "Capability filter: all, supports-structured-output, supports-grounding, supports-extended-reasoning, supports-vision",
    )],
    required: &[],
    exactly_one_of: &[],
};

static EMBED_SCHEMA: InputSchema = InputSchema {
    properties: &[
        Property::new("text", SchemaType::String, "Text to embed"),
        Property::new("model", SchemaType::String, "Embedding model id"),
    ],
    required: &["text"],
    exactly_one_of: &[],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolKind {
    Generate,
    VisionAnalyze,
    TokenCount,
    ListModels,
    Embed,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: &'static InputSchema,
    pub tags: &'static [&'static str],
    kind: ToolKind,
}

pub static TOOL_CATALOG: &[ToolDescriptor] = &[
    ToolDescriptor {
        name: GENERATE_TOOL,
        description: "Generate text with a Gemini model, optionally continuing a conversation session",
        input_schema: &GENERATE_SCHEMA,
        tags: &["generation", "conversation", "structured-output", "grounding"],
        kind: ToolKind::Generate,
    },
    ToolDescriptor {
        name: VISION_ANALYZE_TOOL,
        description: "Analyze an image given by URL or inline base64 data",
        input_schema: &VISION_ANALYZE_SCHEMA,
        tags: &["vision", "generation"],
        kind: ToolKind::VisionAnalyze,
    },
    ToolDescriptor {
        name: TOKEN_COUNT_TOOL,
        description: "Count the tokens a text uses for a model",
        input_schema: &TOKEN_COUNT_SCHEMA,
        tags: &["tokens"],
        kind: ToolKind::TokenCount,
    },
    ToolDescriptor {
        name: LIST_MODELS_TOOL,
        description: "List available models, optionally filtered by capability",
        input_schema: &LIST_MODELS_SCHEMA,
        tags: &["catalog"],
        kind: ToolKind::ListModels,
    },
    ToolDescriptor {
        name: EMBED_TOOL,
        description: "Create a text embedding vector",
        input_schema: &EMBED_SCHEMA,
        tags: &["embedding"],
        kind: ToolKind::Embed,
    },
];

impl ToolDescriptor {
    /// The SDK `Tool` advertised by `tools/list`; capability tags ride in `_meta`.
    pub fn to_tool(&self) -> Result<Tool, AppError> {
        let descriptor = json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema.to_json(),
            "_meta": { "tags": self.tags },
        });

        serde_json::from_value(descriptor).map_err(|err| {
            AppError::internal(format!("tool `{}` has an invalid descriptor: {err}", self.name))
        })
    }

    pub async fn invoke(&self, state: &AppState, arguments: Value) -> Result<ToolOutput, AppError> {
        let arguments = self.input_schema.validate(arguments)?;
        debug!(tool = %self.name, "tool arguments validated");

        match self.kind {
            ToolKind::Generate => generate(state, parse_arguments(arguments)?).await,
            ToolKind::VisionAnalyze => vision_analyze(state, parse_arguments(arguments)?).await,
            ToolKind::TokenCount => token_count(state, parse_arguments(arguments)?).await,
            ToolKind::ListModels => list_models(parse_arguments(arguments)?),
            ToolKind::Embed => embed(state, parse_arguments(arguments)?).await,
        }
    }
}

pub fn find_tool(name: &str) -> Option<&'static ToolDescriptor> {
    TOOL_CATALOG.iter().find(|tool| tool.name == name)
}

pub fn build_tools_list() -> Result<Vec<Tool>, AppError> {
    TOOL_CATALOG.iter().map(ToolDescriptor::to_tool).collect()
}

/// Human-readable text plus structured metadata for one tool result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub structured: Map<String, Value>,
}

impl ToolOutput {
    pub fn into_call_tool_result(self) -> CallToolResult {
        CallToolResult {
            content: vec![ContentBlock::from(TextContent::new(self.text, None, None))],
            is_error: None,
            meta: None,
            structured_content: Some(self.structured),
        }
    }
}

pub async fn handle_tools_call(state: &AppState, params: Option<Value>) -> Result<Value, AppError> {
    let raw_params = params.ok_or_else(|| {
        AppError::invalid_arguments("invalid_params", "tools/call requires params")
    })?;
    let tool_call: CallToolRequestParams = serde_json::from_value(raw_params).map_err(|err| {
        AppError::invalid_arguments("invalid_params", format!("invalid tools/call params: {err}"))
    })?;

    let tool = find_tool(&tool_call.name).ok_or_else(|| AppError::UnknownTool {
        name: tool_call.name.clone(),
    })?;

    let arguments = Value::Object(tool_call.arguments.unwrap_or_default());
    let output = tool.invoke(state, arguments).await?;

    serde_json::to_value(output.into_call_tool_result())
        .map_err(|err| AppError::internal(format!("tool result serialization failed: {err}")))
}

fn parse_arguments<T: DeserializeOwned>(arguments: Map<String, Value>) -> Result<T, AppError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|err| AppError::invalid_arguments("invalid_arguments", err.to_string()))
}

fn generated_at_utc() -> Value {
    json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateArgs {
    pub prompt: String,
    pub model: Option<String>,
    pub system_instruction: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f64>,
    pub structured_output: Option<bool>,
    pub output_schema: Option<Value>,
    pub grounding: Option<bool>,
    pub safety_thresholds: Option<Vec<SafetySetting>>,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionAnalyzeArgs {
    pub prompt: String,
    pub image_ref: Option<String>,
    pub image_data: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TextArgs {
    pub text: String,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListModelsArgs {
    pub filter: Option<String>,
}

fn resolve_model(state: &AppState, requested: Option<String>) -> String {
    normalize_optional(requested).unwrap_or_else(|| state.default_model.to_string())
}

fn ensure_capability(
    model: &str,
    supported: fn(&ModelCapabilities) -> bool,
    feature: &str,
) -> Result<(), AppError> {
    match find_model(model) {
        Some(info) if !supported(&info.capabilities) => Err(AppError::invalid_arguments(
            "unsupported_capability",
            format!("model `{}` does not support {feature}", info.id),
        )),
        _ => Ok(()),
    }
}

pub async fn generate(state: &AppState, args: GenerateArgs) -> Result<ToolOutput, AppError> {
    let model = resolve_model(state, args.model);
    let structured_output = args.structured_output.unwrap_or(false);
    let grounding = args.grounding.unwrap_or(false);

    if structured_output {
        ensure_capability(&model, |caps| caps.structured_output, "structured output")?;
    }
    if grounding {
        ensure_capability(&model, |caps| caps.grounding, "search grounding")?;
    }

    let config = GenerationConfig {
        temperature: args.temperature,
        max_output_tokens: args.max_tokens,
        top_k: args.top_k,
        top_p: args.top_p,
        response_mime_type: structured_output.then(|| "application/json".to_string()),
        response_schema: if structured_output { args.output_schema } else { None },
    };

    let session_id = normalize_optional(args.session_id);
    // Held until the new turns are appended so same-session calls run one at a time.
    let mut session = match session_id.as_deref() {
        Some(id) => Some(state.conversations.lock_session(id).await),
        None => None,
    };

    let user_turn = ConversationTurn::user_text(args.prompt);
    let mut contents = session
        .as_ref()
        .map(|session| session.turns().to_vec())
        .unwrap_or_default();
    contents.push(user_turn.clone());

    let request = GenerationRequest {
        model,
        contents,
        system_instruction: normalize_optional(args.system_instruction),
        config,
        grounding,
        safety_settings: args.safety_thresholds.unwrap_or_default(),
    };

    let result = state.provider.generate(&request).await?;

    let mut structured = generation_metadata(&result);
    if let Some(session) = session.as_mut() {
        session.append([user_turn, result.model_turn.clone()]);
        structured.insert("sessionId".to_string(), json!(session.session_id()));
        structured.insert("historyLength".to_string(), json!(session.turns().len()));
    }

    if structured_output {
        if let Ok(parsed) = serde_json::from_str::<Value>(&result.text) {
            structured.insert("json".to_string(), parsed);
        }
    }

    Ok(ToolOutput {
        text: render_generation_text(&result),
        structured,
    })
}

pub async fn vision_analyze(state: &AppState, args: VisionAnalyzeArgs) -> Result<ToolOutput, AppError> {
    let model = resolve_model(state, args.model);
    ensure_capability(&model, |caps| caps.vision, "image input")?;

    let image_ref = normalize_optional(args.image_ref);
    let image_data = normalize_optional(args.image_data);

    let (image_part, source) = match (image_ref, image_data) {
        (Some(url), None) => (Part::Text(format!("Image reference: {url}")), json!({ "imageRef": url })),
        (None, Some(raw)) => {
            let image = parse_inline_image(&raw)?;
            let source = json!({ "mimeType": image.mime_type, "bytesBase64": image.data.len() });
            (
                Part::InlineData {
                    mime_type: image.mime_type,
                    data: image.data,
                },
                source,
            )
        }
        _ => {
            return Err(ValidationError::ExactlyOneOf {
                fields: IMAGE_SOURCES,
            }
            .into())
        }
    };

    let request = GenerationRequest {
        model,
        contents: vec![ConversationTurn::user(vec![image_part, Part::Text(args.prompt)])],
        system_instruction: None,
        config: GenerationConfig::default(),
        grounding: false,
        safety_settings: Vec::new(),
    };

    let result = state.provider.generate(&request).await?;
    let mut structured = generation_metadata(&result);
    structured.insert("image".to_string(), source);

    Ok(ToolOutput {
        text: render_generation_text(&result),
        structured,
    })
}

pub async fn token_count(state: &AppState, args: TextArgs) -> Result<ToolOutput, AppError> {
    let model = resolve_model(state, args.model);
    let total_tokens = state
        .provider
        .count_tokens(&model, &[ConversationTurn::user_text(args.text)])
        .await?;

    Ok(ToolOutput {
        text: format!("{total_tokens} tokens (model: {model})"),
        structured: Map::from_iter([
            ("totalTokens".to_string(), json!(total_tokens)),
            ("model".to_string(), json!(model)),
        ]),
    })
}

pub fn list_models(args: ListModelsArgs) -> Result<ToolOutput, AppError> {
    let filter = ModelFilter::parse(args.filter.as_deref());
    let models = filter_models(MODEL_CATALOG, filter);

    let lines = models
        .iter()
        .map(|model| format!("- {}: {}", model.id, model.description))
        .collect::<Vec<_>>();

    Ok(ToolOutput {
        text: format!("Returned {} models\n{}", models.len(), lines.join("\n")),
        structured: Map::from_iter([
            ("count".to_string(), json!(models.len())),
            ("models".to_string(), json!(models)),
            ("generatedAtUtc".to_string(), generated_at_utc()),
        ]),
    })
}

pub async fn embed(state: &AppState, args: TextArgs) -> Result<ToolOutput, AppError> {
    let model = normalize_optional(args.model).unwrap_or_else(|| state.embedding_model.to_string());
    let embedding = state.provider.embed(&model, &args.text).await?;
    let dimensions = embedding.len();

    Ok(ToolOutput {
        text: format!("Generated {dimensions}-dimensional embedding (model: {model})"),
        structured: Map::from_iter([
            ("embedding".to_string(), json!(embedding)),
            ("dimensions".to_string(), json!(dimensions)),
            ("model".to_string(), json!(model)),
        ]),
    })
}

fn generation_metadata(result: &GenerationResult) -> Map<String, Value> {
    let mut metadata = Map::from_iter([
        ("model".to_string(), json!(result.model)),
        ("finishReason".to_string(), json!(result.finish_reason)),
        ("candidateCount".to_string(), json!(result.candidate_count)),
        ("generatedAtUtc".to_string(), generated_at_utc()),
    ]);
    if let Some(usage) = &result.usage {
        metadata.insert("usage".to_string(), json!(usage));
    }
    if !result.grounding_sources.is_empty() {
        metadata.insert("groundingSources".to_string(), json!(result.grounding_sources));
    }
    metadata
}

fn render_generation_text(result: &GenerationResult) -> String {
    let mut text = if result.text.trim().is_empty() {
        format!(
            "(no text returned, finish reason: {})",
            result.finish_reason.as_deref().unwrap_or("unknown")
        )
    } else {
        result.text.clone()
    };

    if !result.grounding_sources.is_empty() {
        text.push_str("\n\nSources:");
        for source in &result.grounding_sources {
            text.push_str("\n- ");
            text.push_str(source);
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        conversation::{ConversationStore, InMemoryConversationStore, Role},
        gemini_client::{GenerationResult, ModelProvider, TokenUsage},
    };

    /// Records every generation request; prompts containing "fail" error out and
    /// prompts containing "slow" take 200ms.
    #[derive(Default)]
    struct RecordingProvider {
        requests: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl ModelProvider for RecordingProvider {
        async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AppError> {
            self.requests
                .lock()
                .expect("requests lock")
                .push(request.clone());

            let prompt = request
                .contents
                .last()
                .and_then(|turn| turn.parts.last())
                .map(|part| match part {
                    Part::Text(text) => text.clone(),
                    Part::InlineData { .. } => String::new(),
                })
                .unwrap_or_default();
            if prompt.contains("fail") {
                return Err(AppError::provider(Some(500), "backend unavailable"));
            }
            if prompt.contains("slow") {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }

            let text = format!("echo: {prompt}");
            Ok(GenerationResult {
                model_turn: ConversationTurn::model_text(&text),
                text,
                finish_reason: Some("STOP".to_string()),
                candidate_count: 1,
                usage: Some(TokenUsage {
                    prompt_tokens: 4,
                    output_tokens: 2,
                    total_tokens: 6,
                    reasoning_tokens: None,
                }),
                model: request.model.clone(),
                grounding_sources: Vec::new(),
            })
        }

        async fn count_tokens(&self, _model: &str, contents: &[ConversationTurn]) -> Result<u64, AppError> {
            Ok(contents.len() as u64 * 7)
        }

        async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>, AppError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    fn state() -> (AppState, Arc<RecordingProvider>, Arc<InMemoryConversationStore>) {
        let provider = Arc::new(RecordingProvider::default());
        let store = Arc::new(InMemoryConversationStore::new());
        let state = AppState::new(
            provider.clone(),
            store.clone(),
            "gemini-2.5-flash",
            "text-embedding-004",
        );
        (state, provider, store)
    }

    async fn call(state: &AppState, name: &str, arguments: Value) -> Result<ToolOutput, AppError> {
        find_tool(name)
            .expect("tool exists")
            .invoke(state, arguments)
            .await
    }

    #[test]
    fn catalog_lists_five_tools_with_schemas() {
        let tools = build_tools_list().expect("valid tool descriptors");
        let listed = json!({ "tools": serde_json::to_value(&tools).expect("serialize tools") });
        let names = listed["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .map(|tool| tool["name"].as_str().expect("name").to_string())
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec!["generate", "vision-analyze", "token-count", "list-models", "embed"]
        );
        assert_eq!(listed["tools"][0]["inputSchema"]["required"], json!(["prompt"]));
        assert_eq!(
            listed["tools"][1]["inputSchema"]["properties"]["imageRef"]["description"],
            "Remote image URL (provide exactly one of: imageRef, imageData)"
        );
        assert_eq!(listed["tools"][1]["_meta"]["tags"], json!(["vision", "generation"]));
        assert_eq!(
            listed["tools"][0]["inputSchema"]["properties"]["safetyThresholds"]["items"]["required"],
            json!(["category", "threshold"])
        );
    }

    #[tokio::test]
    async fn generate_with_session_sends_prior_history_in_order() {
        let (state, provider, store) = state();

        call(&state, GENERATE_TOOL, json!({ "prompt": "first", "sessionId": "s1" }))
            .await
            .expect("first call");
        let second = call(&state, GENERATE_TOOL, json!({ "prompt": "second", "sessionId": "s1" }))
            .await
            .expect("second call");

        let requests = provider.requests.lock().expect("requests lock");
        assert_eq!(requests[0].contents.len(), 1);
        assert_eq!(requests[1].contents.len(), 3);
        assert_eq!(
            requests[1].contents,
            vec![
                ConversationTurn::user_text("first"),
                ConversationTurn::model_text("echo: first"),
                ConversationTurn::user_text("second"),
            ]
        );
        assert_eq!(second.structured["historyLength"], 4);
        assert_eq!(store.history("s1").await.expect("session").len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_generate_calls_on_one_session_run_in_turn() {
        let (state, provider, store) = state();

        let first = tokio::spawn({
            let state = state.clone();
            async move {
                let arguments = json!({ "prompt": "slow first", "sessionId": "s1" });
                call(&state, GENERATE_TOOL, arguments).await
            }
        });
        // Let the first call take the session and park inside the provider.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = tokio::spawn({
            let state = state.clone();
            async move {
                let arguments = json!({ "prompt": "second", "sessionId": "s1" });
                call(&state, GENERATE_TOOL, arguments).await
            }
        });

        first.await.expect("first task").expect("first call");
        second.await.expect("second task").expect("second call");

        let requests = provider.requests.lock().expect("requests lock").clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].contents,
            vec![
                ConversationTurn::user_text("slow first"),
                ConversationTurn::model_text("echo: slow first"),
                ConversationTurn::user_text("second"),
            ]
        );
        assert_eq!(store.history("s1").await.expect("session").len(), 4);
    }

    #[tokio::test]
    async fn failed_generate_leaves_session_untouched() {
        let (state, _provider, store) = state();

        let err = call(&state, GENERATE_TOOL, json!({ "prompt": "please fail", "sessionId": "s1" }))
            .await
            .expect_err("provider failure");

        assert_eq!(err.code(), "provider_error");
        assert!(store.history("s1").await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn generate_maps_controls_onto_the_request() {
        let (state, provider, _store) = state();

        let output = call(
            &state,
            GENERATE_TOOL,
            json!({
                "prompt": "{}",
                "model": "gemini-2.5-pro",
                "systemInstruction": "be terse",
                "temperature": 0.3,
                "maxTokens": 128,
                "topK": 20,
                "topP": 0.8,
                "structuredOutput": true,
                "outputSchema": { "type": "object" },
                "grounding": true,
                "safetyThresholds": [
                    { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_NONE" }
                ]
            }),
        )
        .await
        .expect("generate");

        let requests = provider.requests.lock().expect("requests lock");
        let request = &requests[0];
        assert_eq!(request.model, "gemini-2.5-pro");
        assert_eq!(request.system_instruction.as_deref(), Some("be terse"));
        assert_eq!(request.config.max_output_tokens, Some(128));
        assert_eq!(request.config.response_mime_type.as_deref(), Some("application/json"));
        assert_eq!(request.config.response_schema, Some(json!({ "type": "object" })));
        assert!(request.grounding);
        assert_eq!(request.safety_settings.len(), 1);
        assert_eq!(output.structured["model"], "gemini-2.5-pro");
        assert_eq!(output.structured["usage"]["totalTokens"], 6);
        assert!(output.structured.get("sessionId").is_none());
    }

    #[tokio::test]
    async fn generate_rejects_invalid_arguments_before_calling_provider() {
        let (state, provider, _store) = state();

        let missing = call(&state, GENERATE_TOOL, json!({ "temperature": 0.5 })).await;
        let bad_enum = call(
            &state,
            GENERATE_TOOL,
            json!({
                "prompt": "hi",
                "safetyThresholds": [{ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "SOMETIMES" }]
            }),
        )
        .await;
        let unsupported = call(
            &state,
            GENERATE_TOOL,
            json!({ "prompt": "hi", "model": "gemini-2.0-flash-lite", "grounding": true }),
        )
        .await;

        assert_eq!(missing.expect_err("missing prompt").code(), "missing_field");
        assert_eq!(bad_enum.expect_err("bad enum").code(), "invalid_enum_value");
        assert_eq!(
            unsupported.expect_err("unsupported").code(),
            "unsupported_capability"
        );
        assert!(provider.requests.lock().expect("requests lock").is_empty());
    }

    #[tokio::test]
    async fn vision_requires_exactly_one_image_source() {
        let (state, _provider, _store) = state();

        let neither = call(&state, VISION_ANALYZE_TOOL, json!({ "prompt": "what is this" })).await;
        let both = call(
            &state,
            VISION_ANALYZE_TOOL,
            json!({ "prompt": "what", "imageRef": "https://x/y.png", "imageData": "aGVsbG8=" }),
        )
        .await;

        assert_eq!(neither.expect_err("neither").code(), "exactly_one_of");
        assert_eq!(both.expect_err("both").code(), "exactly_one_of");
    }

    #[tokio::test]
    async fn vision_inline_data_without_prefix_uses_default_mime_type() {
        let (state, provider, _store) = state();

        let output = call(
            &state,
            VISION_ANALYZE_TOOL,
            json!({ "prompt": "describe", "imageData": "aGVsbG8=" }),
        )
        .await
        .expect("vision call");

        let requests = provider.requests.lock().expect("requests lock");
        let turn = &requests[0].contents[0];
        assert_eq!(turn.role, Role::User);
        assert_eq!(
            turn.parts[0],
            Part::InlineData {
                mime_type: "image/jpeg".to_string(),
                data: "aGVsbG8=".to_string(),
            }
        );
        assert_eq!(output.structured["image"]["mimeType"], "image/jpeg");
    }

    #[tokio::test]
    async fn vision_image_ref_is_passed_as_text() {
        let (state, provider, _store) = state();

        call(
            &state,
            VISION_ANALYZE_TOOL,
            json!({ "prompt": "describe", "imageRef": "https://example.com/cat.png" }),
        )
        .await
        .expect("vision call");

        let requests = provider.requests.lock().expect("requests lock");
        assert_eq!(
            requests[0].contents[0].parts[0],
            Part::Text("Image reference: https://example.com/cat.png".to_string())
        );
    }

    #[tokio::test]
    async fn token_count_and_embed_report_model() {
        let (state, _provider, _store) = state();

        let count = call(&state, TOKEN_COUNT_TOOL, json!({ "text": "hello" }))
            .await
            .expect("token count");
        let embedding = call(&state, EMBED_TOOL, json!({ "text": "hello" }))
            .await
            .expect("embed");

        assert_eq!(count.structured["totalTokens"], 7);
        assert_eq!(count.structured["model"], "gemini-2.5-flash");
        assert_eq!(embedding.structured["dimensions"], 3);
        assert_eq!(embedding.structured["model"], "text-embedding-004");
    }

    #[tokio::test]
    async fn list_models_filters_by_capability() {
        let (state, _provider, _store) = state();

        let reasoning = call(
            &state,
            LIST_MODELS_TOOL,
            json!({ "filter": "supports-extended-reasoning" }),
        )
        .await
        .expect("list models");
        let everything = call(&state, LIST_MODELS_TOOL, json!({ "filter": "nonsense" }))
            .await
            .expect("list models");

        assert_eq!(reasoning.structured["count"], 2);
        assert_eq!(everything.structured["count"], MODEL_CATALOG.len());
    }

    #[tokio::test]
    async fn tools_call_reports_unknown_tool() {
        let (state, _provider, _store) = state();

        let err = handle_tools_call(&state, Some(json!({ "name": "teleport", "arguments": {} })))
            .await
            .expect_err("unknown tool");

        assert_eq!(err.to_string(), "unknown tool: teleport");
    }

    #[tokio::test]
    async fn tools_call_wraps_output_as_call_tool_result() {
        let (state, _provider, _store) = state();

        let result = handle_tools_call(
            &state,
            Some(json!({ "name": "token-count", "arguments": { "text": "hi" } })),
        )
        .await
        .expect("tool result");

        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "7 tokens (model: gemini-2.5-flash)");
        assert_eq!(result["structuredContent"]["totalTokens"], 7);
    }
}
