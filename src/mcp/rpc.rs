//! JSON-RPC envelope representations and formatting utilities
//!
//! Provides the request/response envelopes exchanged over the transport and the
//! standardized mapping of internal `AppError`s to JSON-RPC error objects.

use rust_mcp_sdk::schema::{RequestId, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::AppError;

pub const JSONRPC_VERSION: &str = "2.0";

pub mod error_codes {
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// One incoming message. An absent `id` marks a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestEnvelope {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Exactly one of `result` or `error` is ever present on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(RpcError),
}

impl ResponseEnvelope {
    pub fn result(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: Outcome::Result(result),
        }
    }

    pub fn error(id: RequestId, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: Outcome::Error(error),
        }
    }
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

pub fn app_error_to_rpc_error(err: &AppError) -> RpcError {
    let code = match err {
        AppError::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
        _ => error_codes::INTERNAL_ERROR,
    };

    RpcError {
        code,
        message: err.to_string(),
        data: Some(json!({
            "code": err.code(),
            "details": err.details(),
        })),
    }
}

pub fn app_error_to_response(id: RequestId, err: &AppError) -> ResponseEnvelope {
    ResponseEnvelope::error(id, app_error_to_rpc_error(err))
}
