use serde::{Deserialize, Serialize};

/// Where a retrieved record came from. Doc/overview/web records are
/// structurally identical; the discriminant lets the context builder treat
/// them uniformly while keeping ranking rules per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Doc,
    Overview,
    Web,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Overview => "overview",
            Self::Web => "web",
        }
    }
}

/// A candidate knowledge-source record flowing through the retrieval
/// pipeline. `content` is only populated while building context; once a
/// record has been reduced to a citation entry it is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: Option<String>,
    /// Document-store naming field.
    pub name: Option<String>,
    /// Overview-store naming field.
    pub title: Option<String>,
    /// Only present on web results.
    pub url: Option<String>,
    /// Similarity or relevance value. Not normalized across kinds — web
    /// records carry a fixed placeholder score.
    pub score: Option<f32>,
    pub kind: SourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl SourceRecord {
    pub fn doc(id: impl Into<String>, score: f32, content: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
            title: None,
            url: None,
            score: Some(score),
            kind: SourceKind::Doc,
            content: Some(content.into()),
        }
    }

    pub fn overview(id: impl Into<String>, score: f32, content: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
            title: None,
            url: None,
            score: Some(score),
            kind: SourceKind::Overview,
            content: Some(content.into()),
        }
    }

    /// Display label: id, else title, else name, else a literal placeholder.
    pub fn label(&self) -> &str {
        self.id
            .as_deref()
            .or(self.title.as_deref())
            .or(self.name.as_deref())
            .unwrap_or("unlabeled")
    }

    /// Copy of this record with `content` dropped, suitable for returning
    /// as a citation/source entry.
    pub fn without_content(&self) -> Self {
        Self {
            content: None,
            ..self.clone()
        }
    }
}

/// The bounded text block handed to the generative model, plus the
/// structured source list it was built from (content stripped).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBlock {
    pub text: String,
    pub sources: Vec<SourceRecord>,
}

impl ContextBlock {
    /// Sentinel text emitted when no record survives filtering.
    pub const EMPTY_SENTINEL: &'static str = "no relevant document found";

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Coarse signal for how well retrieved context likely covers the query.
/// Soft input to downstream heuristics, never a hard gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceHint {
    Low,
    Medium,
    High,
}

/// Inline control token extracted from raw model output:
/// `[#src:<key> score=<float> kind=<doc|overview|web>]`.
/// Derived on demand from text, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationMarker {
    pub key: String,
    pub score: Option<f32>,
    pub kind: Option<SourceKind>,
}

/// One turn of conversation history, most-recent-last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// An in-memory document for the last-resort local ranking tier. The
/// embedding is precomputed by whoever loaded the corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalDocument {
    pub id: String,
    pub name: String,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}
