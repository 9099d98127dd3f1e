//! Last-resort similarity ranking over an in-memory document set.
//!
//! Invoked only when the remote vector search returns zero combined results.
//! Documents arrive with precomputed embeddings; anything missing one is
//! excluded outright.

use crate::embeddings::cosine_similarity;
use crate::types::{LocalDocument, SourceKind, SourceRecord};

/// Rank `documents` against `query_vector` by cosine similarity, keeping
/// items above `min_similarity`. When the similarity filter wipes out a
/// non-empty candidate set, the first `top_k` documents are returned in raw
/// order instead — stale context beats no context on this tier.
pub fn rank_local(
    query_vector: &[f32],
    documents: &[LocalDocument],
    top_k: usize,
    min_similarity: f32,
) -> Vec<SourceRecord> {
    let mut scored: Vec<(f32, &LocalDocument)> = documents
        .iter()
        .filter_map(|doc| {
            let embedding = doc.embedding.as_ref()?;
            Some((cosine_similarity(query_vector, embedding), doc))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let relevant: Vec<SourceRecord> = scored
        .iter()
        .filter(|(score, _)| *score > min_similarity)
        .take(top_k)
        .map(|(score, doc)| to_record(doc, *score))
        .collect();

    if relevant.is_empty() && !documents.is_empty() {
        tracing::debug!(
            candidates = documents.len(),
            "Local ranking found nothing above threshold — falling back to raw order"
        );
        return documents
            .iter()
            .take(top_k)
            .map(|doc| to_record(doc, 0.0))
            .collect();
    }

    relevant
}

fn to_record(doc: &LocalDocument, score: f32) -> SourceRecord {
    SourceRecord {
        id: Some(doc.id.clone()),
        name: Some(doc.name.clone()),
        title: None,
        url: None,
        score: Some(score),
        kind: SourceKind::Doc,
        content: Some(doc.content.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::local_embed;

    fn doc(id: &str, text: &str) -> LocalDocument {
        LocalDocument {
            id: id.to_string(),
            name: format!("{}.md", id),
            content: text.to_string(),
            embedding: Some(local_embed(text, 64)),
        }
    }

    #[test]
    fn test_exact_match_ranks_first() {
        let docs = vec![
            doc("a", "sprint retrospective notes"),
            doc("b", "quarterly revenue targets"),
            doc("c", "team onboarding checklist"),
        ];
        let query = local_embed("quarterly revenue targets", 64);
        let ranked = rank_local(&query, &docs, 3, 0.1);
        assert_eq!(ranked[0].id.as_deref(), Some("b"));
        assert!(ranked[0].score.unwrap() > 0.99);
    }

    #[test]
    fn test_documents_without_embedding_are_excluded() {
        let mut missing = doc("a", "anything");
        missing.embedding = None;
        let docs = vec![missing, doc("b", "payroll calendar")];
        let query = local_embed("payroll calendar", 64);
        let ranked = rank_local(&query, &docs, 5, 0.1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id.as_deref(), Some("b"));
    }

    #[test]
    fn test_empty_filter_falls_back_to_raw_order() {
        let docs = vec![doc("a", "alpha"), doc("b", "beta"), doc("c", "gamma")];
        let query = local_embed("unrelated query text", 64);
        // Impossible threshold: nothing passes, so the first top_k documents
        // come back in insertion order with zeroed scores.
        let ranked = rank_local(&query, &docs, 2, 2.0);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id.as_deref(), Some("a"));
        assert_eq!(ranked[1].id.as_deref(), Some("b"));
        assert_eq!(ranked[0].score, Some(0.0));
    }

    #[test]
    fn test_empty_corpus_yields_empty() {
        let query = local_embed("anything", 64);
        assert!(rank_local(&query, &[], 5, 0.1).is_empty());
    }
}
