//! Context assembly — merges, scores, dedupes and truncates candidate
//! records into a single bounded text block plus a structured source list.
//!
//! `build` is a pure deterministic function of its inputs: identical inputs
//! always produce identical output (score order, insertion order for ties).

use crate::config::{ConfidenceConfig, RetrievalConfig};
use crate::rag::postprocess::strip_inline_markers;
use crate::types::{ConfidenceHint, ContextBlock, SourceKind, SourceRecord};

/// How far back from the cut point to look for a word boundary.
const WORD_BOUNDARY_WINDOW: usize = 40;

/// Marker appended to excerpts that were cut.
const TRUNCATION_MARKER: &str = "…";

pub struct ContextBuilder {
    max_docs: usize,
    max_chars_per_doc: usize,
    min_score: f32,
    dedupe_key_fields: Vec<String>,
}

impl ContextBuilder {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            max_docs: config.max_docs,
            max_chars_per_doc: config.max_chars_per_doc,
            min_score: config.min_score,
            dedupe_key_fields: config.dedupe_key_fields.clone(),
        }
    }

    /// Build the bounded context block from doc, overview and web records.
    ///
    /// Overviews and docs are merged, score-filtered, sorted descending and
    /// deduped; web records are appended after the sorted vector records so
    /// a placeholder-scored web hit can never outrank a scored vector hit.
    /// The result is capped at `max_docs` labeled excerpts.
    pub fn build(
        &self,
        doc_records: Vec<SourceRecord>,
        overview_records: Vec<SourceRecord>,
        web_records: Vec<SourceRecord>,
    ) -> ContextBlock {
        let mut working: Vec<SourceRecord> = Vec::new();
        for mut record in overview_records {
            record.kind = SourceKind::Overview;
            working.push(record);
        }
        for mut record in doc_records {
            record.kind = SourceKind::Doc;
            working.push(record);
        }

        // Records without a numeric score pass through the filter.
        working.retain(|record| record.score.map_or(true, |s| s >= self.min_score));

        // Stable sort: ties keep insertion order.
        working.sort_by(|a, b| {
            let sa = a.score.unwrap_or(f32::MIN);
            let sb = b.score.unwrap_or(f32::MIN);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });

        for mut record in web_records {
            record.kind = SourceKind::Web;
            working.push(record);
        }

        let mut seen_keys: Vec<String> = Vec::new();
        let mut surviving: Vec<SourceRecord> = Vec::new();
        for record in working {
            let key = self.dedupe_key(&record);
            if !key.is_empty() {
                if seen_keys.iter().any(|k| *k == key) {
                    continue;
                }
                seen_keys.push(key);
            }
            surviving.push(record);
            if surviving.len() == self.max_docs {
                break;
            }
        }

        let blocks: Vec<String> = surviving.iter().map(|r| self.render_block(r)).collect();
        let text = if blocks.is_empty() {
            ContextBlock::EMPTY_SENTINEL.to_string()
        } else {
            blocks.join("\n\n")
        };

        ContextBlock {
            text,
            sources: surviving.iter().map(SourceRecord::without_content).collect(),
        }
    }

    /// Composite dedupe key: configured fields concatenated in order,
    /// skipping absent ones. An empty key means "never deduplicated".
    fn dedupe_key(&self, record: &SourceRecord) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for field in &self.dedupe_key_fields {
            let value = match field.as_str() {
                "id" => record.id.as_deref(),
                "name" => record.name.as_deref(),
                "title" => record.title.as_deref(),
                "url" => record.url.as_deref(),
                _ => None,
            };
            if let Some(value) = value {
                parts.push(value);
            }
        }
        parts.join("|")
    }

    fn render_block(&self, record: &SourceRecord) -> String {
        let header = match record.score {
            Some(score) => format!(
                "[#src:{} score={:.2} kind={}]",
                record.label(),
                score,
                record.kind.as_str()
            ),
            None => format!("[#src:{} kind={}]", record.label(), record.kind.as_str()),
        };

        let content = record.content.as_deref().unwrap_or("");
        // Strip any markers already embedded in stored content so they
        // cannot collide with the header we emit.
        let cleaned = strip_inline_markers(content);
        let (excerpt, truncated) = truncate_word_safe(&cleaned, self.max_chars_per_doc);

        if truncated {
            format!("{}\n{}{}", header, excerpt, TRUNCATION_MARKER)
        } else {
            format!("{}\n{}", header, excerpt)
        }
    }
}

/// Cut `text` to at most `max_chars` characters without splitting a word:
/// when the cut point falls within `WORD_BOUNDARY_WINDOW` characters of a
/// space, back up to that space. Returns the excerpt and whether it was cut.
pub fn truncate_word_safe(text: &str, max_chars: usize) -> (String, bool) {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return (text.to_string(), false);
    }

    let mut cut = max_chars;
    let window_start = max_chars.saturating_sub(WORD_BOUNDARY_WINDOW);
    for i in (window_start..max_chars).rev() {
        if chars[i] == ' ' {
            cut = i;
            break;
        }
    }

    let excerpt: String = chars[..cut].iter().collect();
    (excerpt.trim_end().to_string(), true)
}

/// Aggregate confidence over all considered records (pre-filter), bucketed
/// at the configured thresholds. No scored records at all means Low.
pub fn confidence_hint(records: &[SourceRecord], config: &ConfidenceConfig) -> ConfidenceHint {
    let scores: Vec<f32> = records.iter().filter_map(|r| r.score).collect();
    if scores.is_empty() {
        return ConfidenceHint::Low;
    }
    let mean = scores.iter().sum::<f32>() / scores.len() as f32;
    if mean < config.low_ceiling {
        ConfidenceHint::Low
    } else if mean <= config.medium_ceiling {
        ConfidenceHint::Medium
    } else {
        ConfidenceHint::High
    }
}
