//! The central Model Context Protocol engine
//!
//! Provides method routing (`initialize`, `tools/*`, `resources/list`,
//! `prompts/list`), capabilities negotiation and the error boundary that turns
//! every handler failure into a JSON-RPC error envelope.

use std::time::Instant;

use rust_mcp_sdk::schema::{
    Implementation, InitializeResult, ListToolsResult, ProtocolVersion, ServerCapabilities,
    ServerCapabilitiesPrompts, ServerCapabilitiesResources, ServerCapabilitiesTools,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::domain::{
    resources::{build_prompts_list, build_resources_list},
    tools::{build_tools_list, handle_tools_call},
};
use crate::mcp::rpc::{app_error_to_response, RequestEnvelope, ResponseEnvelope};
use crate::{errors::AppError, AppState};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

const MAX_AUDIT_STRING_LEN: usize = 256;

/// Routes one envelope. Notifications never produce a response.
pub async fn handle_envelope(state: &AppState, request: RequestEnvelope) -> Option<ResponseEnvelope> {
    let started_at = Instant::now();
    let RequestEnvelope {
        id, method, params, ..
    } = request;
    let audit_params = redact_audit_params(params.as_ref());

    let outcome = dispatch(state, &method, params).await;
    let elapsed_ms = started_at.elapsed().as_millis();

    let Some(id) = id else {
        debug!(
            method = %method,
            outcome = if outcome.is_ok() { "success" } else { "failure" },
            duration_ms = elapsed_ms,
            "notification handled"
        );
        return None;
    };

    info!(
        method = %method,
        id = ?id,
        params = %audit_params,
        outcome = if outcome.is_ok() { "success" } else { "failure" },
        duration_ms = elapsed_ms,
        "mcp action audited"
    );

    Some(match outcome {
        Ok(result) => ResponseEnvelope::result(id, result),
        Err(err) => {
            info!(method = %method, error = %err, "request failed");
            app_error_to_response(id, &err)
        }
    })
}

pub async fn dispatch(
    state: &AppState,
    method: &str,
    params: Option<Value>,
) -> Result<Value, AppError> {
    match method {
        "initialize" => to_result("initialize", initialize_result(params.as_ref())),
        "ping" => Ok(json!({})),
        "tools/list" => to_result(
            "tools/list",
            ListToolsResult {
                meta: None,
                next_cursor: None,
                tools: build_tools_list()?,
            },
        ),
        "tools/call" => handle_tools_call(state, params).await,
        "resources/list" => to_result("resources/list", build_resources_list()),
        "prompts/list" => to_result("prompts/list", build_prompts_list()?),
        notification if notification.starts_with("notifications/") => Ok(Value::Null),
        other => Err(AppError::MethodNotFound {
            method: other.to_string(),
        }),
    }
}

fn to_result<T: Serialize>(method: &str, result: T) -> Result<Value, AppError> {
    serde_json::to_value(result)
        .map_err(|err| AppError::internal(format!("{method} result serialization failed: {err}")))
}

pub fn initialize_result(params: Option<&Value>) -> InitializeResult {
    let protocol_version = negotiate_protocol_version(params);

    InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            resources: Some(ServerCapabilitiesResources {
                subscribe: Some(false),
                list_changed: Some(false),
            }),
            prompts: Some(ServerCapabilitiesPrompts {
                list_changed: Some(false),
            }),
            ..Default::default()
        },
        protocol_version: protocol_version.into(),
        instructions: None,
        meta: None,
    }
}

/// Always answers with the one supported version; clients decide whether to continue.
pub fn negotiate_protocol_version(params: Option<&Value>) -> ProtocolVersion {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty());

    if let Some(offered) = offered_version {
        if offered != SUPPORTED_PROTOCOL_VERSION {
            info!(
                offered = %offered,
                supported = SUPPORTED_PROTOCOL_VERSION,
                "client offered a different protocol version"
            );
        }
    }

    ProtocolVersion::V2024_11_05
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        Value::String(text) if text.len() > MAX_AUDIT_STRING_LEN => {
            Value::String(format!("[{} bytes elided]", text.len()))
        }
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "password" | "secret" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
