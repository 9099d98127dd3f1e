//! Vector-store RPC client.
//!
//! Thin wrapper over two named remote procedures against logically distinct
//! indexes ("documents" and "overviews"). Errors of any kind collapse to an
//! empty result set — the caller decides when to fall back to local ranking,
//! and supplies its own time budget around these calls.

pub mod local;
pub mod web;

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::types::{SourceKind, SourceRecord};

pub struct VectorSearchClient {
    config: RetrievalConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct DocRow {
    id: Option<String>,
    name: Option<String>,
    content: Option<String>,
    score: Option<f32>,
}

#[derive(Deserialize)]
struct OverviewRow {
    id: Option<String>,
    title: Option<String>,
    content: Option<String>,
    score: Option<f32>,
}

impl VectorSearchClient {
    pub fn new(config: RetrievalConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_millis(config.timeout_ms.max(1000)))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Query the document index. Never errors; transport or shape failures
    /// return an empty list.
    pub async fn search_docs(&self, query_vector: &[f32], top_k: usize) -> Vec<SourceRecord> {
        let rows: Vec<DocRow> = match self.rpc("match_documents", query_vector, top_k).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "Document vector search failed — returning empty");
                return Vec::new();
            }
        };
        rows.into_iter()
            .map(|row| SourceRecord {
                id: row.id,
                name: row.name,
                title: None,
                url: None,
                score: row.score,
                kind: SourceKind::Doc,
                content: row.content,
            })
            .collect()
    }

    /// Query the overview index. Same tolerance contract as `search_docs`.
    pub async fn search_overviews(&self, query_vector: &[f32], top_k: usize) -> Vec<SourceRecord> {
        let rows: Vec<OverviewRow> = match self.rpc("match_overviews", query_vector, top_k).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "Overview vector search failed — returning empty");
                return Vec::new();
            }
        };
        rows.into_iter()
            .map(|row| SourceRecord {
                id: row.id,
                name: None,
                title: row.title,
                url: None,
                score: row.score,
                kind: SourceKind::Overview,
                content: row.content,
            })
            .collect()
    }

    async fn rpc<T: serde::de::DeserializeOwned>(
        &self,
        procedure: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> anyhow::Result<Vec<T>> {
        if self.config.endpoint.is_empty() {
            anyhow::bail!("No vector-store endpoint configured");
        }
        let url = format!("{}/rpc/{}", self.config.endpoint.trim_end_matches('/'), procedure);
        let body = json!({
            "query_embedding": query_vector,
            "match_count": top_k,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("RPC {} failed: {}", procedure, e))?;
        if !response.status().is_success() {
            anyhow::bail!("RPC {} returned HTTP {}", procedure, response.status());
        }
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| anyhow::anyhow!("RPC {} returned unexpected shape: {}", procedure, e))
    }
}
