//! Optional web-search adapter.
//!
//! Normalizes an external search API's results into the shared source-record
//! shape. The provider exposes no comparable relevance score, so every
//! record carries a fixed neutral placeholder. Invocation is gated by the
//! prompt assembler's heuristic, never unconditional.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::WebSearchConfig;
use crate::types::{SourceKind, SourceRecord};

pub struct WebSearchAdapter {
    config: WebSearchConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct WebSearchResponse {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Deserialize)]
struct WebResult {
    title: Option<String>,
    url: Option<String>,
    #[serde(alias = "snippet")]
    content: Option<String>,
}

impl WebSearchAdapter {
    pub fn new(config: WebSearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_millis(config.timeout_ms.max(1000)))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled && !self.config.endpoint.is_empty()
    }

    /// Search the web for `query`. Races the call against the configured
    /// timeout; timeout, non-2xx and parse failures all return empty.
    pub async fn search(&self, query: &str) -> Vec<SourceRecord> {
        if !self.enabled() {
            return Vec::new();
        }

        let call = self.request(query);
        match tokio::time::timeout(Duration::from_millis(self.config.timeout_ms), call).await {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Web search failed — omitting web results");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.timeout_ms,
                    "Web search timed out — omitting web results"
                );
                Vec::new()
            }
        }
    }

    async fn request(&self, query: &str) -> anyhow::Result<Vec<SourceRecord>> {
        let body = json!({
            "query": query,
            "max_results": self.config.max_results,
        });

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Web search API returned HTTP {}", response.status());
        }

        let parsed: WebSearchResponse = response.json().await?;
        Ok(parsed
            .results
            .into_iter()
            .take(self.config.max_results)
            .map(|result| SourceRecord {
                id: None,
                name: result.title.clone(),
                title: result.title,
                url: result.url,
                score: Some(self.config.placeholder_score),
                kind: SourceKind::Web,
                content: result.content,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_adapter_returns_empty() {
        let adapter = WebSearchAdapter::new(WebSearchConfig::default());
        assert!(!adapter.enabled());
        assert!(adapter.search("latest market prices").await.is_empty());
    }

    #[tokio::test]
    async fn test_enabled_without_endpoint_is_still_disabled() {
        let adapter = WebSearchAdapter::new(WebSearchConfig {
            enabled: true,
            endpoint: String::new(),
            ..Default::default()
        });
        assert!(!adapter.enabled());
    }
}
