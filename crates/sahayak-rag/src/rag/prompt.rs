//! Prompt assembly — persona policy, bounded history, context block and the
//! web-search gate heuristic.

use serde::{Deserialize, Serialize};

use crate::config::{ConfidenceConfig, WebSearchConfig};
use crate::types::{ContextBlock, ConversationMessage};

/// Behavioral policy for the assistant persona: tone, response bound and
/// topic allow/deny lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaPolicy {
    pub name: String,
    pub tone: String,
    pub word_limit: usize,
    pub allowed_topics: Vec<String>,
    pub forbidden_topics: Vec<String>,
}

impl Default for PersonaPolicy {
    fn default() -> Self {
        Self {
            name: "Sahayak".to_string(),
            tone: "professional, direct and encouraging".to_string(),
            word_limit: 250,
            allowed_topics: vec![
                "objectives and key results".to_string(),
                "sprint planning".to_string(),
                "team performance".to_string(),
                "business strategy".to_string(),
            ],
            forbidden_topics: vec![
                "medical advice".to_string(),
                "legal advice".to_string(),
                "investment recommendations".to_string(),
            ],
        }
    }
}

/// Result of assembling a generation request: the final prompt text plus
/// the forbidden topic that was detected, if any.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub text: String,
    pub forbidden_topic: Option<String>,
}

/// Case-insensitive substring match against the persona's forbidden list.
/// Detection annotates the prompt with a refusal instruction; it never
/// blocks the request — refusal is left to the model under instruction.
pub fn detect_forbidden_topic(query: &str, persona: &PersonaPolicy) -> Option<String> {
    let query_lower = query.to_lowercase();
    persona
        .forbidden_topics
        .iter()
        .find(|topic| query_lower.contains(&topic.to_lowercase()))
        .cloned()
}

/// Combine persona policy, a bounded history suffix, the context block and
/// the user query into the final generation prompt.
pub fn assemble(
    query: &str,
    persona: &PersonaPolicy,
    history: &[ConversationMessage],
    context: &ContextBlock,
    history_window: usize,
) -> AssembledPrompt {
    let forbidden_topic = detect_forbidden_topic(query, persona);

    let mut prompt = String::new();
    prompt.push_str(&format!(
        "You are {}, an embedded business assistant. Tone: {}. \
         Keep responses under {} words.\n",
        persona.name, persona.tone, persona.word_limit
    ));
    if !persona.allowed_topics.is_empty() {
        prompt.push_str(&format!(
            "You help with: {}.\n",
            persona.allowed_topics.join(", ")
        ));
    }
    if !persona.forbidden_topics.is_empty() {
        prompt.push_str(&format!(
            "You never give guidance on: {}.\n",
            persona.forbidden_topics.join(", ")
        ));
    }
    if let Some(topic) = &forbidden_topic {
        prompt.push_str(&format!(
            "The user's question touches on \"{}\", which you must not advise on. \
             Politely decline that part and offer what you can help with instead.\n",
            topic
        ));
    }

    prompt.push_str(
        "\nWhen a statement is grounded in a context excerpt, cite it by repeating \
         the excerpt's [#src:...] marker inline, byte for byte.\n",
    );

    let recent = recent_history(history, history_window);
    if !recent.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        for message in recent {
            prompt.push_str(&format!("{}: {}\n", message.role, message.content));
        }
    }

    prompt.push_str(&format!("\nContext:\n{}\n", context.text));
    prompt.push_str(&format!("\nUser question: {}\n", query));

    AssembledPrompt {
        text: prompt,
        forbidden_topic,
    }
}

/// Last `window` turns, order preserved.
fn recent_history(history: &[ConversationMessage], window: usize) -> &[ConversationMessage] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

// ============================================================================
// Web-search gate
// ============================================================================

/// Query patterns suggesting a need for current or external facts that the
/// internal knowledge base is unlikely to hold.
const CURRENT_FACTS_PATTERNS: &[&str] = &[
    "news",
    "latest",
    "current",
    "today",
    "this week",
    "price",
    "prices",
    "stock",
    "market",
    "statistic",
    "statistics",
    "benchmark",
    "methodology",
    "updated",
    "recent",
    "search online",
    "search the web",
];

/// Decides when the optional web-search adapter is worth its latency.
/// Web search is never unconditional: it runs only when globally enabled
/// and at least one trigger fires.
pub struct WebSearchGate {
    enabled: bool,
    confidence_floor: f32,
}

impl WebSearchGate {
    pub fn new(web: &WebSearchConfig, confidence: &ConfidenceConfig) -> Self {
        Self {
            enabled: web.enabled,
            confidence_floor: confidence.web_gate_floor,
        }
    }

    /// Pre-retrieval decision: explicit caller override, or the intent
    /// heuristic. A positive answer lets web search run concurrently with
    /// vector search instead of serializing after it.
    pub fn upfront(&self, query: &str, force: bool) -> bool {
        if !self.enabled {
            return false;
        }
        force || Self::wants_current_facts(query)
    }

    /// Post-retrieval decision: the primary context came back empty, or the
    /// aggregate confidence sits below the configured floor.
    pub fn post_retrieval(&self, context_empty: bool, mean_score: Option<f32>) -> bool {
        if !self.enabled {
            return false;
        }
        context_empty || mean_score.map_or(true, |score| score < self.confidence_floor)
    }

    fn wants_current_facts(query: &str) -> bool {
        let query_lower = query.to_lowercase();
        CURRENT_FACTS_PATTERNS
            .iter()
            .any(|pattern| query_lower.contains(pattern))
    }
}
