//! Generation clients — remote model API with a labeled offline fallback.
//!
//! Providers expose a uniform contract: a complete generation plus a
//! word-by-word streamed variant with a fixed inter-token delay, so the
//! consumer sees the same incremental sequence regardless of whether the
//! underlying provider streams natively.

pub mod external;
pub mod streaming;

pub use external::{GeminiProvider, OfflineProvider};
pub use streaming::TokenStream;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
}

impl From<&GenerationSettings> for GenerationParams {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate the complete response for `prompt`.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    /// Streamed variant: the complete response split into whitespace-
    /// delimited words, yielded with a fixed inter-token delay. The default
    /// keeps the consumer contract identical for non-streaming providers.
    async fn generate_stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
        token_delay: Duration,
    ) -> Result<TokenStream> {
        let full = self.generate(prompt, params).await?;
        let (tx, stream) = TokenStream::channel(64);
        tokio::spawn(async move {
            let mut words = full.split_whitespace().peekable();
            while let Some(word) = words.next() {
                let fragment = if words.peek().is_some() {
                    format!("{} ", word)
                } else {
                    word.to_string()
                };
                if tx.send(fragment).await.is_err() {
                    return;
                }
                tokio::time::sleep(token_delay).await;
            }
        });
        Ok(stream)
    }

    fn name(&self) -> &str;

    /// Whether responses come from a real model (false = simulated/offline).
    fn is_live(&self) -> bool;
}

/// Pick a provider from the generation settings: the remote model when a
/// credential is resolvable, otherwise the clearly-labeled offline fallback.
/// Credential absence is a supported mode, not an error.
pub fn provider_from_settings(settings: &GenerationSettings) -> Arc<dyn LlmProvider> {
    match external::resolve_key(settings) {
        Some(api_key) => {
            tracing::debug!(model = %settings.model, "Using remote generation provider");
            Arc::new(GeminiProvider::new(api_key, settings.model.clone()))
        }
        None => {
            tracing::info!("No generation credential resolvable — using offline provider");
            Arc::new(OfflineProvider)
        }
    }
}
