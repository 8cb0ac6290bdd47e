//! Tool catalog, argument validation and handler implementations
//!
//! Provides the business logic exposed over the MCP protocol, delegating model
//! calls to the `ModelProvider` and session history to the `ConversationStore`.

pub mod models;
pub mod resources;
pub mod schema;
pub mod tools;
pub mod utils;
