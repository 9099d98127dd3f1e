use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagConfig {
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub web: WebSearchConfig,
    pub confidence: ConfidenceConfig,
    pub generation: GenerationSettings,
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Remote embedding calls are off by default for stability; the
    /// deterministic local embedding is the baseline correctness net.
    pub remote_enabled: bool,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
    /// Expired entries are swept once the cache grows past this size.
    pub cache_sweep_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the remote vector-store RPC endpoint.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub top_k: usize,
    pub max_docs: usize,
    pub max_chars_per_doc: usize,
    pub min_score: f32,
    /// Fields concatenated into the dedupe key, in order.
    pub dedupe_key_fields: Vec<String>,
    /// Minimum cosine similarity for the local fallback ranking.
    pub local_min_similarity: f32,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub max_results: usize,
    pub timeout_ms: u64,
    /// The provider exposes no comparable relevance score; every web
    /// record carries this neutral placeholder instead.
    pub placeholder_score: f32,
}

/// Confidence bucket thresholds and the web-search gate floor. These were
/// magic constants in earlier iterations; configuration keeps them tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Mean score below this bucket is Low.
    pub low_ceiling: f32,
    /// Mean score at or below this bucket is Medium; above is High.
    pub medium_ceiling: f32,
    /// Aggregate confidence below this floor triggers the web-search gate.
    pub web_gate_floor: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
    /// Conversation turns included in the assembled prompt.
    pub history_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Inter-token delay for simulated progressive delivery.
    pub token_delay_ms: u64,
    /// Render coalescing window — at most one UI update per frame.
    pub frame_interval_ms: u64,
}

impl RagConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.embedding.dimension == 0 {
            return invalid("embedding.dimension must be > 0");
        }
        if self.retrieval.top_k == 0 {
            return invalid("retrieval.top_k must be > 0");
        }
        if self.retrieval.max_docs == 0 {
            return invalid("retrieval.max_docs must be > 0");
        }
        if self.retrieval.max_chars_per_doc < 50 {
            return invalid("retrieval.max_chars_per_doc must be >= 50");
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return invalid("retrieval.min_score must be in [0.0, 1.0]");
        }
        if self.confidence.low_ceiling > self.confidence.medium_ceiling {
            return invalid("confidence.low_ceiling must be <= confidence.medium_ceiling");
        }
        if self.streaming.frame_interval_ms == 0 {
            return invalid("streaming.frame_interval_ms must be > 0");
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            remote_enabled: false,
            api_key: None,
            model: "text-embedding-004".to_string(),
            dimension: 768,
            timeout_ms: 4000,
            cache_ttl_secs: 300,
            cache_sweep_threshold: 100,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            top_k: 8,
            max_docs: 6,
            max_chars_per_doc: 1200,
            min_score: 0.25,
            dedupe_key_fields: vec![
                "id".to_string(),
                "name".to_string(),
                "title".to_string(),
            ],
            local_min_similarity: 0.1,
            timeout_ms: 3000,
        }
    }
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: None,
            max_results: 4,
            timeout_ms: 6000,
            placeholder_score: 0.5,
        }
    }
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            low_ceiling: 0.2,
            medium_ceiling: 0.4,
            web_gate_floor: 0.3,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            history_window: 5,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            token_delay_ms: 18,
            frame_interval_ms: 16,
        }
    }
}
