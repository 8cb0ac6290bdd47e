use std::sync::Arc;

use gemini_mcp_server::{
    config::Config, conversation::InMemoryConversationStore, gemini_client::GeminiClient, logging,
    stdio::StdioServer, AppState,
};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env().inspect_err(|err| error!(error = %err, "invalid configuration"))?;

    let provider = Arc::new(GeminiClient::new(&config.api_base_url, &config.api_key)?);
    let conversations = Arc::new(InMemoryConversationStore::new());
    let state = AppState::new(
        provider,
        conversations,
        &config.default_model,
        &config.embedding_model,
    );

    info!(
        framing = ?config.framing,
        default_model = %config.default_model,
        api_base_url = %config.api_base_url,
        "server starting"
    );

    StdioServer::new(state, config.framing)
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await?;
    Ok(())
}
