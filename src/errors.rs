use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::schema::ValidationError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid arguments: {message}")]
    InvalidArguments { code: &'static str, message: String },
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("method not found: {method}")]
    MethodNotFound { method: String },
    #[error("provider error: {message}")]
    Provider { status: Option<u16>, message: String },
    #[error("internal error: {message}")]
    Internal { code: &'static str, message: String },
}

impl AppError {
    pub fn invalid_arguments(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            code,
            message: message.into(),
        }
    }

    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }

    /// Machine-readable code carried in the error envelope's `data`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArguments { code, .. } | Self::Internal { code, .. } => code,
            Self::UnknownTool { .. } => "tool_not_found",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::Provider { .. } => "provider_error",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::UnknownTool { name } => json!({ "name": name }),
            Self::MethodNotFound { method } => json!({ "method": method }),
            Self::Provider {
                status: Some(status),
                ..
            } => json!({ "status": status }),
            _ => json!({}),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::invalid_arguments(err.code(), err.to_string())
    }
}
