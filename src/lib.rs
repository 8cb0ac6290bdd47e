use std::sync::Arc;

pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod framing;
pub mod gemini_client;
pub mod logging;
pub mod mcp;
pub mod stdio;

use conversation::ConversationStore;
use gemini_client::ModelProvider;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn ModelProvider>,
    pub conversations: Arc<dyn ConversationStore>,
    pub default_model: Arc<str>,
    pub embedding_model: Arc<str>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        conversations: Arc<dyn ConversationStore>,
        default_model: &str,
        embedding_model: &str,
    ) -> Self {
        Self {
            provider,
            conversations,
            default_model: Arc::<str>::from(default_model),
            embedding_model: Arc::<str>::from(embedding_model),
        }
    }
}
