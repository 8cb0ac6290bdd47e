//! Static resource and prompt catalogs
//!
//! Advertised for client discovery only; nothing in the server reads them back.

use rust_mcp_sdk::schema::{ListPromptsResult, ListResourcesResult, Prompt, Resource};
use serde_json::json;

use crate::errors::AppError;

pub const MODELS_RESOURCE_URI: &str = "gemini://models";
pub const CAPABILITIES_RESOURCE_URI: &str = "gemini://capabilities";
pub const HELP_RESOURCE_URI: &str = "gemini://help/usage";

fn resource(uri: &str, name: &str, description: &str, mime_type: &str) -> Resource {
    Resource {
        annotations: None,
        description: Some(description.to_string()),
        icons: vec![],
        meta: None,
        mime_type: Some(mime_type.to_string()),
        name: name.to_string(),
        size: None,
        title: None,
        uri: uri.to_string(),
    }
}

pub fn build_resources_list() -> ListResourcesResult {
    ListResourcesResult {
        meta: None,
        next_cursor: None,
        resources: vec![
            resource(
                MODELS_RESOURCE_URI,
                "Available Models",
                "Catalog of models and their capabilities",
                "application/json",
            ),
            resource(
                CAPABILITIES_RESOURCE_URI,
                "Server Capabilities",
                "Tools and generation features offered by this server",
                "text/markdown",
            ),
            resource(
                HELP_RESOURCE_URI,
                "Usage Guide",
                "How to call each tool, including conversation sessions",
                "text/markdown",
            ),
        ],
    }
}

pub fn build_prompts_list() -> Result<ListPromptsResult, AppError> {
    let prompts = json!([
        {
            "name": "code_review",
            "description": "Review code for bugs, style and performance issues",
            "arguments": [
                { "name": "code", "description": "Code to review", "required": true },
                { "name": "language", "description": "Programming language", "required": false }
            ]
        },
        {
            "name": "explain_with_reasoning",
            "description": "Explain a topic step by step using an extended-reasoning model",
            "arguments": [
                { "name": "topic", "description": "Topic to explain", "required": true },
                { "name": "level", "description": "Audience level", "required": false }
            ]
        },
        {
            "name": "creative_writing",
            "description": "Write a piece in a requested style",
            "arguments": [
                { "name": "prompt", "description": "What to write about", "required": true },
                { "name": "style", "description": "Writing style", "required": false },
                { "name": "length", "description": "Desired length", "required": false }
            ]
        }
    ]);

    let prompts: Vec<Prompt> = serde_json::from_value(prompts)
        .map_err(|err| AppError::internal(format!("prompt catalog is invalid: {err}")))?;

    Ok(ListPromptsResult {
        meta: None,
        next_cursor: None,
        prompts,
    })
}
