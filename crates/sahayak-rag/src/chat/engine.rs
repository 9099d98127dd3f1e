//! The end-to-end ask pipeline: embed, retrieve, assemble, generate, stream.
//!
//! A new ask supersedes any in-flight one. The engine tracks the active
//! request's cancellation token; starting a new request cancels the old
//! token, and the superseded pipeline stops forwarding fragments at the
//! next await point instead of racing the new response to the consumer.

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::RagConfig;
use crate::embeddings::{local_embed, EmbeddingProvider, TaskType};
use crate::llm::{
    provider_from_settings, GenerationParams, LlmProvider, TokenStream,
};
use crate::rag::context_builder::{confidence_hint, ContextBuilder};
use crate::rag::postprocess::{finalize, FinalizedResponse, MAX_DISPLAY_CHARS};
use crate::rag::prompt::{self, PersonaPolicy, WebSearchGate};
use crate::search::web::WebSearchAdapter;
use crate::search::{local::rank_local, VectorSearchClient};
use crate::types::{ConfidenceHint, ContextBlock, ConversationMessage, LocalDocument, SourceRecord};

/// Rendered when generation itself fails. Streamed as a single message so
/// the consumer path stays uniform.
pub const GENERATION_APOLOGY: &str =
    "I'm sorry, I couldn't generate a response right now. Please try again in a moment.";

#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Run web search regardless of the gate heuristic.
    pub force_web_search: bool,
}

/// Collected (non-streaming) result of one ask.
#[derive(Debug, Clone)]
pub struct AskResult {
    pub response: FinalizedResponse,
    pub context: ContextBlock,
    pub confidence: ConfidenceHint,
}

struct Retrieval {
    context: ContextBlock,
    confidence: ConfidenceHint,
}

pub struct ChatEngine {
    config: RagConfig,
    embeddings: Arc<EmbeddingProvider>,
    vector_search: Arc<VectorSearchClient>,
    web_search: Arc<WebSearchAdapter>,
    context_builder: ContextBuilder,
    web_gate: WebSearchGate,
    provider: Arc<dyn LlmProvider>,
    persona: PersonaPolicy,
    /// Last-resort corpus for when the remote vector store is unreachable.
    local_corpus: RwLock<Vec<LocalDocument>>,
    /// Token of the in-flight ask, if any.
    active: Mutex<Option<CancellationToken>>,
}

impl ChatEngine {
    pub fn new(config: RagConfig) -> Self {
        let provider = provider_from_settings(&config.generation);
        Self::with_provider(config, provider)
    }

    /// Construct with an explicit generation provider.
    pub fn with_provider(config: RagConfig, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            embeddings: Arc::new(EmbeddingProvider::new(config.embedding.clone())),
            vector_search: Arc::new(VectorSearchClient::new(config.retrieval.clone())),
            web_search: Arc::new(WebSearchAdapter::new(config.web.clone())),
            context_builder: ContextBuilder::new(&config.retrieval),
            web_gate: WebSearchGate::new(&config.web, &config.confidence),
            provider,
            persona: PersonaPolicy::default(),
            local_corpus: RwLock::new(Vec::new()),
            active: Mutex::new(None),
            config,
        }
    }

    pub fn set_persona(&mut self, persona: PersonaPolicy) {
        self.persona = persona;
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingProvider> {
        &self.embeddings
    }

    /// Replace the local fallback corpus. Documents without a precomputed
    /// embedding get the deterministic local one.
    pub fn set_local_corpus(&self, mut documents: Vec<LocalDocument>) {
        let dimension = self.config.embedding.dimension;
        for doc in &mut documents {
            if doc.embedding.is_none() {
                doc.embedding = Some(local_embed(&doc.content, dimension));
            }
        }
        tracing::debug!(count = documents.len(), "Local fallback corpus loaded");
        *self.local_corpus.write() = documents;
    }

    /// Retrieval tier: vector search (docs and overviews concurrently, web
    /// alongside when the upfront gate fires), local ranking when the
    /// vector store yields nothing, then a post-retrieval web pass when
    /// the context came back empty or weak.
    async fn retrieve(&self, query: &str, options: &AskOptions) -> Retrieval {
        let query_vector = self
            .embeddings
            .embed(query, TaskType::RetrievalQuery, None)
            .await;

        let top_k = self.config.retrieval.top_k;
        let run_web_upfront = self.web_gate.upfront(query, options.force_web_search);

        let (mut docs, overviews, mut web) = tokio::join!(
            self.vector_search.search_docs(&query_vector, top_k),
            self.vector_search.search_overviews(&query_vector, top_k),
            async {
                if run_web_upfront {
                    self.web_search.search(query).await
                } else {
                    Vec::new()
                }
            }
        );

        if docs.is_empty() && overviews.is_empty() {
            let corpus = self.local_corpus.read();
            if !corpus.is_empty() {
                tracing::debug!("Vector store empty or unreachable, ranking local corpus");
                docs = rank_local(
                    &query_vector,
                    &corpus,
                    top_k,
                    self.config.retrieval.local_min_similarity,
                );
            }
        }

        // Confidence is computed over everything considered, before the
        // builder's score filter narrows the set.
        let considered: Vec<SourceRecord> = docs
            .iter()
            .chain(overviews.iter())
            .cloned()
            .collect();
        let confidence = confidence_hint(&considered, &self.config.confidence);
        let mean_score = mean_score(&considered);

        if !run_web_upfront
            && web.is_empty()
            && self
                .web_gate
                .post_retrieval(considered.is_empty(), mean_score)
        {
            web = self.web_search.search(query).await;
        }

        let context = self.context_builder.build(docs, overviews, web);
        Retrieval {
            context,
            confidence,
        }
    }

    /// Register a fresh cancellation token as the active request,
    /// cancelling whichever request held that slot before.
    fn supersede(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self.active.lock().replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }

    /// Ask with progressive delivery. Returns the token stream immediately;
    /// the pipeline runs in a background task. Starting another ask cancels
    /// this one, and a cancelled stream simply ends early.
    pub fn ask(
        self: Arc<Self>,
        query: &str,
        history: Vec<ConversationMessage>,
        options: AskOptions,
    ) -> TokenStream {
        let cancel = self.supersede();
        let (tx, stream) = TokenStream::channel(64);
        let engine = self;
        let query = query.to_string();

        tokio::spawn(async move {
            let retrieval = tokio::select! {
                _ = cancel.cancelled() => return,
                retrieval = engine.retrieve(&query, &options) => retrieval,
            };

            let assembled = prompt::assemble(
                &query,
                &engine.persona,
                &history,
                &retrieval.context,
                engine.config.generation.history_window,
            );
            let params = GenerationParams::from(&engine.config.generation);
            let token_delay = Duration::from_millis(engine.config.streaming.token_delay_ms);

            let upstream = tokio::select! {
                _ = cancel.cancelled() => return,
                result = engine
                    .provider
                    .generate_stream(&assembled.text, &params, token_delay) => result,
            };

            match upstream {
                Ok(mut upstream) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        fragment = upstream.next() => match fragment {
                            Some(fragment) => {
                                if tx.send(fragment).await.is_err() {
                                    return;
                                }
                            }
                            None => break,
                        },
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "Generation failed");
                    let _ = tx.send(GENERATION_APOLOGY.to_string()).await;
                }
            }
        });

        stream
    }

    /// Ask without streaming: run the full pipeline, post-process the raw
    /// output and return it with the context it was grounded on.
    pub async fn ask_collected(
        &self,
        query: &str,
        history: &[ConversationMessage],
        options: AskOptions,
    ) -> Result<AskResult> {
        let retrieval = self.retrieve(query, &options).await;
        let assembled = prompt::assemble(
            query,
            &self.persona,
            history,
            &retrieval.context,
            self.config.generation.history_window,
        );
        let params = GenerationParams::from(&self.config.generation);

        let raw = match self.provider.generate(&assembled.text, &params).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "Generation failed");
                GENERATION_APOLOGY.to_string()
            }
        };

        Ok(AskResult {
            response: finalize(&raw, MAX_DISPLAY_CHARS),
            context: retrieval.context,
            confidence: retrieval.confidence,
        })
    }
}

fn mean_score(records: &[SourceRecord]) -> Option<f32> {
    let scores: Vec<f32> = records.iter().filter_map(|r| r.score).collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f32>() / scores.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::OfflineProvider;
    use async_trait::async_trait;

    fn engine_with(provider: Arc<dyn LlmProvider>) -> Arc<ChatEngine> {
        let config = RagConfig {
            embedding: crate::config::EmbeddingConfig {
                dimension: 64,
                ..Default::default()
            },
            ..Default::default()
        };
        Arc::new(ChatEngine::with_provider(config, provider))
    }

    fn corpus() -> Vec<LocalDocument> {
        vec![
            LocalDocument {
                id: "okr-q3".to_string(),
                name: "Q3 OKR review".to_string(),
                content: "Q3 objectives: grow activation by 20%, ship the reporting module."
                    .to_string(),
                embedding: None,
            },
            LocalDocument {
                id: "sprint-14".to_string(),
                name: "Sprint 14 retro".to_string(),
                content: "Sprint 14 closed 18 of 20 points; carry-over: billing migration."
                    .to_string(),
                embedding: None,
            },
        ]
    }

    #[tokio::test]
    async fn test_offline_ask_grounds_on_local_corpus() {
        let engine = engine_with(Arc::new(OfflineProvider));
        engine.set_local_corpus(corpus());

        let result = engine
            .ask_collected("How did sprint 14 go?", &[], AskOptions::default())
            .await
            .unwrap();

        // Vector store is unconfigured; the local fallback guarantees a
        // non-empty context from a non-empty corpus.
        assert!(!result.context.is_empty());
        assert!(result.response.display_text.contains("[offline response]"));
        assert!(result.response.display_text.contains("simulated"));
    }

    #[tokio::test]
    async fn test_empty_corpus_yields_sentinel_context() {
        let engine = engine_with(Arc::new(OfflineProvider));

        let result = engine
            .ask_collected("Anything at all?", &[], AskOptions::default())
            .await
            .unwrap();

        assert!(result.context.is_empty());
        assert_eq!(result.context.text, ContextBlock::EMPTY_SENTINEL);
        assert_eq!(result.confidence, ConfidenceHint::Low);
        assert!(result
            .response
            .display_text
            .contains("No relevant documents were found"));
    }

    #[tokio::test]
    async fn test_streamed_ask_delivers_full_response() {
        let engine = engine_with(Arc::new(OfflineProvider));
        engine.set_local_corpus(corpus());

        let stream = engine
            .clone()
            .ask("Summarize our OKRs", Vec::new(), AskOptions::default());
        let text = stream.collect().await;
        assert!(text.contains("[offline response]"));
    }

    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("slow answer".to_string())
        }

        fn name(&self) -> &str {
            "slow"
        }

        fn is_live(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_ask_supersedes_in_flight_one() {
        let engine = engine_with(Arc::new(SlowProvider));

        let first = engine
            .clone()
            .ask("first question", Vec::new(), AskOptions::default());
        let second = engine
            .clone()
            .ask("second question", Vec::new(), AskOptions::default());

        // The first pipeline was cancelled before its provider finished;
        // its stream ends without delivering anything.
        assert_eq!(first.collect().await, "");
        assert!(second.collect().await.contains("slow answer"));
    }
}
