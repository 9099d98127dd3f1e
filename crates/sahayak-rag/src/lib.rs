pub mod chat;
pub mod config;
pub mod embeddings;
pub mod llm;
pub mod rag;
pub mod search;
pub mod types;

// Re-export primary types for convenience
pub use chat::{AskOptions, AskResult, ChatEngine, RenderSink, StreamConsumer};
pub use config::RagConfig;
pub use rag::{FinalizedResponse, PersonaPolicy};
pub use types::{
    CitationMarker, ConfidenceHint, ContextBlock, ConversationMessage, LocalDocument,
    SourceKind, SourceRecord,
};

// Re-export LLM surface
pub use llm::{GenerationParams, LlmProvider, TokenStream};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
