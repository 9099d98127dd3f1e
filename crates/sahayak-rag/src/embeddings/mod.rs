//! Embedding provider — remote API with deterministic local fallback.
//!
//! Remote mode is off by default. When it is on and a call fails (timeout,
//! non-2xx, malformed payload), the provider degrades to the local embedding
//! and disables remote mode for the rest of its lifetime — a sticky circuit
//! breaker that prevents repeated timeout stalls on every subsequent call.

pub mod local;

pub use local::{cosine_similarity, local_embed};

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::EmbeddingConfig;

/// Embedding task type, forwarded to the remote API and part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    RetrievalQuery,
    RetrievalDocument,
    SemanticSimilarity,
}

impl TaskType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::RetrievalQuery => "RETRIEVAL_QUERY",
            Self::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            Self::SemanticSimilarity => "SEMANTIC_SIMILARITY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    task_type: TaskType,
    title: Option<String>,
    text: String,
}

struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: Instant,
}

pub struct EmbeddingProvider {
    config: EmbeddingConfig,
    client: reqwest::Client,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
    /// Live remote toggle. Starts from config + credential availability;
    /// a failed remote call latches it off for this provider's lifetime.
    remote_enabled: AtomicBool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

impl EmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_millis(config.timeout_ms.max(1000)))
            .build()
            .unwrap_or_default();

        let remote = config.remote_enabled && Self::resolve_key(&config).is_some();
        Self {
            config,
            client,
            cache: Mutex::new(HashMap::new()),
            remote_enabled: AtomicBool::new(remote),
        }
    }

    fn resolve_key(config: &EmbeddingConfig) -> Option<String> {
        config
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }

    /// Flip remote mode for subsequent calls. Enabling re-arms a tripped
    /// circuit breaker; cached entries are not invalidated either way.
    pub fn set_use_remote(&self, enabled: bool) {
        let effective = enabled && Self::resolve_key(&self.config).is_some();
        self.remote_enabled.store(effective, Ordering::Relaxed);
    }

    pub fn remote_active(&self) -> bool {
        self.remote_enabled.load(Ordering::Relaxed)
    }

    /// Embed `text`. Infallible by contract: the deterministic local
    /// embedding is the terminal fallback and cannot fail.
    pub async fn embed(&self, text: &str, task_type: TaskType, title: Option<&str>) -> Vec<f32> {
        let key = CacheKey {
            task_type,
            title: title.map(|t| t.to_string()),
            text: text.to_string(),
        };

        if let Some(cached) = self.cache_get(&key) {
            return cached;
        }

        let vector = if self.remote_enabled.load(Ordering::Relaxed) {
            match self.remote_embed(text, task_type, title).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Remote embedding failed — disabling remote mode for this session"
                    );
                    self.remote_enabled.store(false, Ordering::Relaxed);
                    local_embed(text, self.config.dimension)
                }
            }
        } else {
            local_embed(text, self.config.dimension)
        };

        self.cache_put(key, vector.clone());
        vector
    }

    fn cache_get(&self, key: &CacheKey) -> Option<Vec<f32>> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let cache = self.cache.lock();
        cache
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() < ttl)
            .map(|entry| entry.vector.clone())
    }

    fn cache_put(&self, key: CacheKey, vector: Vec<f32>) {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let mut cache = self.cache.lock();
        if cache.len() >= self.config.cache_sweep_threshold {
            cache.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        }
        cache.insert(
            key,
            CacheEntry {
                vector,
                inserted_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    async fn remote_embed(
        &self,
        text: &str,
        task_type: TaskType,
        title: Option<&str>,
    ) -> Result<Vec<f32>> {
        let api_key = Self::resolve_key(&self.config)
            .ok_or_else(|| anyhow!("No embedding API key resolvable"))?;
        let endpoint = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:embedContent",
            self.config.model
        );

        let mut request = json!({
            "model": format!("models/{}", self.config.model),
            "content": { "parts": [{ "text": text }] },
            "taskType": task_type.as_str(),
        });
        if let Some(title) = title {
            request["title"] = json!(title);
        }

        let call = async {
            let response = self
                .client
                .post(&endpoint)
                .header("x-goog-api-key", &api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| anyhow!("Embedding request failed: {}", e))?;

            if !response.status().is_success() {
                return Err(anyhow!("Embedding API error: HTTP {}", response.status()));
            }

            let parsed: EmbedResponse = response
                .json()
                .await
                .map_err(|e| anyhow!("Malformed embedding payload: {}", e))?;
            Ok(parsed.embedding.values)
        };

        let vector = tokio::time::timeout(Duration::from_millis(self.config.timeout_ms), call)
            .await
            .map_err(|_| anyhow!("Embedding request timed out"))??;

        if vector.len() != self.config.dimension {
            return Err(anyhow!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.config.dimension,
                vector.len()
            ));
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;

    fn provider() -> EmbeddingProvider {
        EmbeddingProvider::new(EmbeddingConfig {
            dimension: 64,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_embed_is_deterministic_across_calls() {
        let provider = provider();
        let a = provider.embed("okr progress", TaskType::RetrievalQuery, None).await;
        let b = provider.embed("okr progress", TaskType::RetrievalQuery, None).await;
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_cache_distinguishes_task_type_and_title() {
        let provider = provider();
        provider.embed("t", TaskType::RetrievalQuery, None).await;
        provider.embed("t", TaskType::RetrievalDocument, None).await;
        provider.embed("t", TaskType::RetrievalDocument, Some("titled")).await;
        assert_eq!(provider.cache_len(), 3);
    }

    #[tokio::test]
    async fn test_cache_sweep_evicts_expired_entries() {
        let provider = EmbeddingProvider::new(EmbeddingConfig {
            dimension: 8,
            cache_ttl_secs: 0,
            cache_sweep_threshold: 4,
            ..Default::default()
        });
        for i in 0..10 {
            provider
                .embed(&format!("text {}", i), TaskType::RetrievalDocument, None)
                .await;
        }
        // With a zero TTL everything before the sweep threshold is expired
        // by the time the sweep runs.
        assert!(provider.cache_len() <= 5);
    }

    #[test]
    fn test_remote_stays_off_without_credential() {
        let provider = EmbeddingProvider::new(EmbeddingConfig {
            remote_enabled: true,
            api_key: None,
            ..Default::default()
        });
        // No key resolvable from config; env may or may not carry one, so
        // only assert the explicit-toggle path with a key present.
        let keyed = EmbeddingProvider::new(EmbeddingConfig {
            remote_enabled: false,
            api_key: Some("test-key".to_string()),
            ..Default::default()
        });
        assert!(!keyed.remote_active());
        keyed.set_use_remote(true);
        assert!(keyed.remote_active());
        keyed.set_use_remote(false);
        assert!(!keyed.remote_active());
        let _ = provider;
    }
}
