//! Static catalog of provider models and capability filtering

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCapabilities {
    pub structured_output: bool,
    pub grounding: bool,
    pub extended_reasoning: bool,
    pub vision: bool,
    pub embedding: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: &'static str,
    pub description: &'static str,
    pub context_window: u32,
    pub capabilities: ModelCapabilities,
}

const GENERATIVE: ModelCapabilities = ModelCapabilities {
    structured_output: true,
    grounding: true,
    extended_reasoning: false,
    vision: true,
    embedding: false,
};

pub static MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo {
        id: "gemini-2.5-pro",
        description: "Most capable reasoning model for complex tasks",
        context_window: 1_048_576,
        capabilities: ModelCapabilities {
            extended_reasoning: true,
            ..GENERATIVE
        },
    },
    ModelInfo {
        id: "gemini-2.5-flash",
        description: "Fast reasoning model balancing quality and latency",
        context_window: 1_048_576,
        capabilities: ModelCapabilities {
            extended_reasoning: true,
            ..GENERATIVE
        },
    },
    ModelInfo {
        id: "gemini-2.5-flash-lite",
        description: "Lowest-latency 2.5 model for high-volume tasks",
        context_window: 1_048_576,
        capabilities: GENERATIVE,
    },
    ModelInfo {
        id: "gemini-2.0-flash",
        description: "General-purpose multimodal model",
        context_window: 1_048_576,
        capabilities: GENERATIVE,
    },
    ModelInfo {
        id: "gemini-2.0-flash-lite",
        description: "Cost-efficient multimodal model without search grounding",
        context_window: 1_048_576,
        capabilities: ModelCapabilities {
            grounding: false,
            ..GENERATIVE
        },
    },
    ModelInfo {
        id: "text-embedding-004",
        description: "Text embedding model producing 768-dimensional vectors",
        context_window: 2_048,
        capabilities: ModelCapabilities {
            structured_output: false,
            grounding: false,
            extended_reasoning: false,
            vision: false,
            embedding: true,
        },
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFilter {
    All,
    StructuredOutput,
    Grounding,
    ExtendedReasoning,
    Vision,
    Embedding,
}

impl ModelFilter {
    /// Unrecognized names fall back to `All`.
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::All;
        };

        match value.trim().to_ascii_lowercase().as_str() {
            "supports-structured-output" | "json_mode" => Self::StructuredOutput,
            "supports-grounding" | "grounding" => Self::Grounding,
            "supports-extended-reasoning" | "thinking" => Self::ExtendedReasoning,
            "supports-vision" | "vision" => Self::Vision,
            "supports-embedding" | "embedding" => Self::Embedding,
            _ => Self::All,
        }
    }

    pub fn matches(self, model: &ModelInfo) -> bool {
        let capabilities = model.capabilities;
        match self {
            Self::All => true,
            Self::StructuredOutput => capabilities.structured_output,
            Self::Grounding => capabilities.grounding,
            Self::ExtendedReasoning => capabilities.extended_reasoning,
            Self::Vision => capabilities.vision,
            Self::Embedding => capabilities.embedding,
        }
    }
}

pub fn filter_models(catalog: &[ModelInfo], filter: ModelFilter) -> Vec<ModelInfo> {
    catalog
        .iter()
        .filter(|model| filter.matches(model))
        .copied()
        .collect()
}

pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    let id = id.trim_start_matches("models/");
    MODEL_CATALOG.iter().find(|model| model.id == id)
}
