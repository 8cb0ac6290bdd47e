use std::env;

use thiserror::Error;

use crate::{
    framing::{Framing, UnknownFraming},
    gemini_client::DEFAULT_API_BASE_URL,
};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub framing: Framing,
    pub api_base_url: String,
    pub default_model: String,
    pub embedding_model: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"[REDACTED]")
            .field("framing", &self.framing)
            .field("api_base_url", &self.api_base_url)
            .field("default_model", &self.default_model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is required and must not be empty")]
    MissingApiKey,
    #[error("MCP_FRAMING is invalid: {0}")]
    InvalidFraming(#[from] UnknownFraming),
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = non_empty_var("GEMINI_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let framing = non_empty_var("MCP_FRAMING")
            .map(|value| value.parse::<Framing>())
            .transpose()?
            .unwrap_or_default();

        let api_base_url = non_empty_var("GEMINI_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let default_model =
            non_empty_var("GEMINI_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let embedding_model = non_empty_var("GEMINI_EMBEDDING_MODEL")
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());

        Ok(Self {
            api_key,
            framing,
            api_base_url,
            default_model,
            embedding_model,
        })
    }
}
